//! Temporary directories and in-memory filesystems for reader tests.

use crate::fs::MemoryFileSystem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary directory that is deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path within this directory.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    /// `file_path` as a string input path.
    #[must_use]
    pub fn input(&self, filename: &str) -> String {
        self.file_path(filename).to_string_lossy().into_owned()
    }
}

/// A `mem://` filesystem holding `files` (`(path, bytes)` pairs).
///
/// # Example
///
/// ```
/// use ironsplit::testing::mock_memory_fs;
///
/// let fs = mock_memory_fs(&[("/in/a.txt", b"one\ntwo\n".as_slice())], 1024);
/// assert_eq!(fs.open_handles(), 0);
/// ```
#[must_use]
pub fn mock_memory_fs(files: &[(&str, &[u8])], block_size: u64) -> Arc<MemoryFileSystem> {
    let fs = MemoryFileSystem::new(block_size);
    for (path, data) in files {
        fs.put(path, data.to_vec());
    }
    Arc::new(fs)
}
