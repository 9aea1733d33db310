use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RUN_DIR_PREFIX: &str = "imgdl_";

/// Scratch layout for one harvest. The whole tree is removed when this drops,
/// on every exit path.
#[derive(Debug)]
pub struct RunDir {
    root: TempDir,
}

impl RunDir {
    pub fn create_in(parent: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let root = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(parent)?;
        let dir = Self { root };
        std::fs::create_dir_all(dir.downloads_dir())?;
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root().join("downloads")
    }

    /// Where the archive goes. Sits beside `downloads/`, never inside it.
    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        self.root().join(file_name)
    }
}
