//! The `file://` filesystem.

use super::{FileStatus, FileSystem, FsPath, SeekRead, not_found};
use crate::error::{Error, IoContext, Result};
use crate::io::glob::expand_glob;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Local disk, reporting a configurable block size (`fs.local.block.size`).
#[derive(Clone, Debug)]
pub struct LocalFileSystem {
    block_size: u64,
}

impl LocalFileSystem {
    #[must_use]
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    fn status_of(&self, local: &Path, path: FsPath) -> Result<FileStatus> {
        let meta = match fs::metadata(local) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(&path)),
            Err(e) => return Err(Error::io(format!("stat {path}"), e)),
        };
        Ok(FileStatus {
            len: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            block_size: self.block_size,
            path,
        })
    }

    fn to_fs_path(local: &Path) -> FsPath {
        let s = local.to_string_lossy();
        if local.is_absolute() {
            FsPath::parse(&format!("file://{s}"))
        } else {
            FsPath::parse(&s)
        }
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new(32 * 1024 * 1024)
    }
}

fn local_path(path: &FsPath) -> PathBuf {
    PathBuf::from(path.path())
}

impl FileSystem for LocalFileSystem {
    fn scheme(&self) -> &str {
        "file"
    }

    fn status(&self, path: &FsPath) -> Result<FileStatus> {
        self.status_of(&local_path(path), path.clone())
    }

    fn list(&self, dir: &FsPath) -> Result<Vec<FileStatus>> {
        let local = local_path(dir);
        let entries = fs::read_dir(&local).io_context(|| format!("list {dir}"))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.io_context(|| format!("list {dir}"))?;
            let name = entry.file_name();
            let child = dir.join(&name.to_string_lossy());
            out.push(self.status_of(&entry.path(), child)?);
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn open(&self, path: &FsPath) -> Result<Box<dyn SeekRead>> {
        let f = File::open(local_path(path)).io_context(|| format!("open {path}"))?;
        Ok(Box::new(f))
    }

    fn glob(&self, pattern: &FsPath) -> Result<Vec<FileStatus>> {
        let mut out = Vec::new();
        for local in expand_glob(pattern.path())? {
            let path = Self::to_fs_path(&local).qualify(pattern);
            out.push(self.status_of(&local, path)?);
        }
        Ok(out)
    }
}
