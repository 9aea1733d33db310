use std::path::Path;
use walkdir::WalkDir;

/// Extensions (lower-case, without the dot) counted as downloaded images.
pub const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tiff"];

/// Counts image files anywhere under `dir`. A missing directory counts as 0.
pub fn count_images(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }

    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_image_extension(entry.path()))
        .count()
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            IMAGE_EXTS.iter().any(|known| *known == lower)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_images_of_missing_dir_is_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(count_images(&dir.path().join("nope")), 0);
    }

    #[test]
    fn count_images_matches_extensions_case_insensitively_and_recurses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        std::fs::write(dir.path().join("one.JPG"), b"x").expect("write");
        std::fs::write(dir.path().join("two.png"), b"x").expect("write");
        std::fs::write(nested.join("three.TiFf"), b"x").expect("write");
        std::fs::write(nested.join("notes.txt"), b"x").expect("write");
        std::fs::write(dir.path().join("noext"), b"x").expect("write");
        std::fs::create_dir_all(dir.path().join("folder.jpg")).expect("mkdir");

        assert_eq!(count_images(dir.path()), 3);
    }

    #[test]
    fn count_images_never_decreases_as_files_are_added() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut last = count_images(dir.path());
        for (i, name) in ["a.gif", "b.txt", "c.webp", "d.bmp", "e.md", "f.jpeg"]
            .iter()
            .enumerate()
        {
            std::fs::write(dir.path().join(name), [i as u8]).expect("write");
            let now = count_images(dir.path());
            assert!(now >= last, "count dropped after adding {name}");
            last = now;
        }
        assert_eq!(last, 4);
    }
}
