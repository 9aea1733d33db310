use crate::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub source_bytes: u64,
    pub archive_bytes: u64,
}

/// Packs every regular file under `src_dir` into a deflated ZIP at `zip_path`.
///
/// Entry names are the files' paths relative to `src_dir`, always with `/`
/// separators. Nothing is filtered out.
pub fn make_zip_from_folder(src_dir: &Path, zip_path: &Path) -> Result<ArchiveSummary> {
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(zip_path)?;
    let mut zip = zip::ZipWriter::new(std::io::BufWriter::new(file));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut entries = 0_usize;
    let mut source_bytes = 0_u64;
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        // The zip file may live inside the folder being packed.
        if entry.path() == zip_path {
            continue;
        }

        let Some(entry_name) = relative_entry_name(src_dir, entry.path()) else {
            continue;
        };
        zip.start_file(entry_name, options)
            .map_err(zip_err_to_io)?;
        let mut src = std::fs::File::open(entry.path())?;
        source_bytes += std::io::copy(&mut src, &mut zip)?;
        entries += 1;
    }

    let mut writer = zip.finish().map_err(zip_err_to_io)?;
    writer.flush()?;
    drop(writer);

    let archive_bytes = std::fs::metadata(zip_path).map(|m| m.len()).unwrap_or(0);
    Ok(ArchiveSummary {
        entries,
        source_bytes,
        archive_bytes,
    })
}

fn relative_entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn zip_err_to_io(err: zip::result::ZipError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_round_trip_preserves_relative_paths_and_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("downloads");
        let nested = src.join("bing").join("page 2");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let files: Vec<(&str, Vec<u8>)> = vec![
            ("000001.jpg", vec![0xFF, 0xD8, 0xFF, 0x00, 0x11]),
            ("bing/000002.png", b"\x89PNG\r\n\x1a\nrest".to_vec()),
            ("bing/page 2/notes.txt", b"stray metadata".to_vec()),
            ("bing/page 2/empty.part", Vec::new()),
        ];
        for (rel, bytes) in &files {
            std::fs::write(src.join(rel), bytes).expect("write");
        }

        let zip_path = dir.path().join("cats.zip");
        let summary = make_zip_from_folder(&src, &zip_path).expect("zip");
        assert_eq!(summary.entries, files.len());
        assert!(summary.archive_bytes > 0);

        let mut archive =
            zip::ZipArchive::new(std::fs::File::open(&zip_path).expect("open")).expect("archive");
        assert_eq!(archive.len(), files.len());
        for (rel, bytes) in &files {
            let mut entry = archive.by_name(rel).expect("entry present");
            let mut out = Vec::new();
            entry.read_to_end(&mut out).expect("read");
            assert_eq!(&out, bytes, "content mismatch for {rel}");
        }
    }

    #[test]
    fn archive_of_empty_folder_has_no_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("downloads");
        std::fs::create_dir_all(&src).expect("mkdir");
        let zip_path = dir.path().join("empty.zip");

        let summary = make_zip_from_folder(&src, &zip_path).expect("zip");
        assert_eq!(summary.entries, 0);

        let archive =
            zip::ZipArchive::new(std::fs::File::open(&zip_path).expect("open")).expect("archive");
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn archive_skips_itself_when_written_inside_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.gif"), b"GIF89a").expect("write");
        let zip_path = dir.path().join("self.zip");

        let summary = make_zip_from_folder(dir.path(), &zip_path).expect("zip");
        assert_eq!(summary.entries, 1);
    }
}
