//! In-memory filesystem for tests and demos.
//!
//! Files live in a shared map keyed by absolute path; directories are implied
//! by path prefixes. The fake can inject read failures and counts open handles
//! so tests can check that readers are released.

use super::{FileStatus, FileSystem, FsPath, SeekRead, not_found};
use crate::error::{Error, Result};
use crate::io::glob::matches_glob;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, Arc<[u8]>>,
    fail_after: BTreeMap<String, u64>,
}

/// In-memory [`FileSystem`] fake.
#[derive(Clone)]
pub struct MemoryFileSystem {
    scheme: String,
    block_size: u64,
    state: Arc<RwLock<MemoryState>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryFileSystem {
    /// A fake serving `mem://` with the given block size.
    #[must_use]
    pub fn new(block_size: u64) -> Self {
        Self::with_scheme("mem", block_size)
    }

    /// A fake serving an arbitrary scheme, e.g. `hdfs` in tests.
    #[must_use]
    pub fn with_scheme(scheme: &str, block_size: u64) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            block_size: block_size.max(1),
            state: Arc::new(RwLock::new(MemoryState::default())),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn normalize(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create or replace a file.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = data.into();
        self.write_state()
            .files
            .insert(Self::normalize(path), Arc::from(bytes));
    }

    /// Make reads of `path` fail once `bytes` bytes have been read.
    pub fn fail_reads_after(&self, path: &str, bytes: u64) {
        self.write_state()
            .fail_after
            .insert(Self::normalize(path), bytes);
    }

    /// Number of handles returned by `open` that are still alive.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn qualified(&self, template: &FsPath, path: &str) -> FsPath {
        FsPath::parse(&format!("{}://{}{}", self.scheme, template.authority(), path))
    }

    fn is_dir(state: &MemoryState, path: &str) -> bool {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        state.files.keys().any(|k| k.starts_with(&prefix))
    }

    fn status_locked(&self, state: &MemoryState, template: &FsPath, path: &str) -> Option<FileStatus> {
        if let Some(data) = state.files.get(path) {
            return Some(FileStatus {
                path: self.qualified(template, path),
                len: data.len() as u64,
                is_dir: false,
                block_size: self.block_size,
            });
        }
        Self::is_dir(state, path).then(|| FileStatus {
            path: self.qualified(template, path),
            len: 0,
            is_dir: true,
            block_size: self.block_size,
        })
    }

    /// Every file and implied directory, as absolute paths.
    fn all_entries(state: &MemoryState) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for file in state.files.keys() {
            out.insert(file.clone());
            let mut cur = file.as_str();
            while let Some(i) = cur.rfind('/') {
                cur = &cur[..i];
                if cur.is_empty() {
                    break;
                }
                out.insert(cur.to_string());
            }
        }
        out
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new(32 * 1024 * 1024)
    }
}

impl FileSystem for MemoryFileSystem {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn status(&self, path: &FsPath) -> Result<FileStatus> {
        let state = self.read_state();
        self.status_locked(&state, path, &Self::normalize(path.path()))
            .ok_or_else(|| not_found(path))
    }

    fn list(&self, dir: &FsPath) -> Result<Vec<FileStatus>> {
        let state = self.read_state();
        let dir_path = Self::normalize(dir.path());
        let prefix = if dir_path == "/" {
            "/".to_string()
        } else {
            format!("{dir_path}/")
        };
        let children: BTreeSet<String> = state
            .files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(|name| format!("{prefix}{name}"))
            .collect();
        if children.is_empty() && !state.files.contains_key(&dir_path) {
            return Err(not_found(dir));
        }
        Ok(children
            .iter()
            .filter_map(|c| self.status_locked(&state, dir, c))
            .collect())
    }

    fn open(&self, path: &FsPath) -> Result<Box<dyn SeekRead>> {
        let state = self.read_state();
        let key = Self::normalize(path.path());
        let Some(data) = state.files.get(&key).cloned() else {
            return Err(Error::io(
                format!("open {path}"),
                io::Error::new(io::ErrorKind::NotFound, format!("File {path} does not exist")),
            ));
        };
        let fail_after = state.fail_after.get(&key).copied();
        drop(state);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            cursor: Cursor::new(data),
            fail_after,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }

    fn glob(&self, pattern: &FsPath) -> Result<Vec<FileStatus>> {
        let state = self.read_state();
        let pat = Self::normalize(pattern.path());
        let mut out = Vec::new();
        for entry in Self::all_entries(&state) {
            if matches_glob(&pat, &entry)?
                && let Some(st) = self.status_locked(&state, pattern, &entry)
            {
                out.push(st);
            }
        }
        Ok(out)
    }
}

struct MemoryHandle {
    cursor: Cursor<Arc<[u8]>>,
    fail_after: Option<u64>,
    open_handles: Arc<AtomicUsize>,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(limit) = self.fail_after {
            let pos = self.cursor.position();
            if pos >= limit {
                return Err(io::Error::other("injected read failure"));
            }
            let allowed = usize::try_from(limit - pos).unwrap_or(usize::MAX).min(buf.len());
            return self.cursor.read(&mut buf[..allowed]);
        }
        self.cursor.read(buf)
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
