//! Filesystem abstraction used by split discovery and record readers.
//!
//! Paths are URIs (`scheme://authority/path`). A path without a scheme is
//! qualified against the configured default filesystem (`fs.defaultFS`). The
//! [`FileSystems`] registry maps schemes to [`FileSystem`] implementations:
//!
//! - [`LocalFileSystem`] for `file`
//! - [`MemoryFileSystem`], an in-memory fake for tests and demos
//!
//! Remote filesystems plug in by implementing [`FileSystem`] and calling
//! [`FileSystems::register`].

pub mod local;
pub mod memory;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;

use crate::config::{Configuration, keys};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Seek};
use std::sync::Arc;

/// A qualified or scheme-less filesystem path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsPath {
    scheme: String,
    authority: String,
    path: String,
}

impl FsPath {
    /// Parse `scheme://authority/path` or a bare path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some((scheme, rest)) = raw.split_once("://")
            && !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            return Self {
                scheme: scheme.to_ascii_lowercase(),
                authority: authority.to_string(),
                path: path.to_string(),
            };
        }
        Self {
            scheme: String::new(),
            authority: String::new(),
            path: raw.to_string(),
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fill in scheme and authority from `default_fs` when this path has none.
    #[must_use]
    pub fn qualify(&self, default_fs: &FsPath) -> Self {
        if !self.scheme.is_empty() {
            return self.clone();
        }
        Self {
            scheme: default_fs.scheme.clone(),
            authority: default_fs.authority.clone(),
            path: self.path.clone(),
        }
    }

    /// Child path `self/name`.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let mut path = self.path.trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(name.trim_start_matches('/'));
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path,
        }
    }

    /// Last path component.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Whether the path contains glob metacharacters.
    #[must_use]
    pub fn has_glob(&self) -> bool {
        crate::io::glob::has_glob_chars(&self.path)
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_empty() {
            f.write_str(&self.path)
        } else {
            write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
        }
    }
}

/// Metadata for one file or directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    pub path: FsPath,
    pub len: u64,
    pub is_dir: bool,
    pub block_size: u64,
}

/// A seekable byte source handed to record readers.
pub trait SeekRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekRead for T {}

/// Operations split discovery and readers need from a filesystem.
///
/// Listings must be sorted by path so split order is deterministic.
pub trait FileSystem: Send + Sync {
    /// URI scheme served by this filesystem, e.g. `file`.
    fn scheme(&self) -> &str;

    /// Status of a single path.
    ///
    /// # Errors
    /// [`Error::Io`] with `NotFound` when the path does not exist.
    fn status(&self, path: &FsPath) -> Result<FileStatus>;

    /// Immediate children of a directory, sorted by path.
    ///
    /// # Errors
    /// [`Error::Io`] if the directory cannot be read.
    fn list(&self, dir: &FsPath) -> Result<Vec<FileStatus>>;

    /// Open a file for sequential/seekable reading.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be opened.
    fn open(&self, path: &FsPath) -> Result<Box<dyn SeekRead>>;

    /// Entries matching a glob pattern, sorted by path. No match is an empty list.
    ///
    /// # Errors
    /// [`Error::Io`] for invalid patterns or listing failures.
    fn glob(&self, pattern: &FsPath) -> Result<Vec<FileStatus>>;

    fn exists(&self, path: &FsPath) -> Result<bool> {
        match self.status(path) {
            Ok(_) => Ok(true),
            Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Scheme → filesystem registry plus the default filesystem.
#[derive(Clone)]
pub struct FileSystems {
    by_scheme: HashMap<String, Arc<dyn FileSystem>>,
    default_fs: FsPath,
}

impl FileSystems {
    /// Registry with the local filesystem registered, configured from `conf`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the local block size is not a number.
    pub fn new(conf: &Configuration) -> Result<Self> {
        let block_size = conf.get_u64(keys::LOCAL_BLOCK_SIZE, 32 * 1024 * 1024)?;
        let mut fs = Self {
            by_scheme: HashMap::new(),
            default_fs: FsPath::parse(&conf.default_fs()),
        };
        fs.register(Arc::new(LocalFileSystem::new(block_size)));
        Ok(fs)
    }

    /// Register (or replace) the filesystem for its scheme.
    pub fn register(&mut self, fs: Arc<dyn FileSystem>) -> &mut Self {
        self.by_scheme.insert(fs.scheme().to_ascii_lowercase(), fs);
        self
    }

    #[must_use]
    pub fn default_fs(&self) -> &FsPath {
        &self.default_fs
    }

    /// Qualify `raw` against the default filesystem and find its implementation.
    ///
    /// # Errors
    /// Returns [`Error::Io`] (`Unsupported`) when no filesystem serves the scheme.
    pub fn resolve(&self, raw: &str) -> Result<(Arc<dyn FileSystem>, FsPath)> {
        let path = FsPath::parse(raw).qualify(&self.default_fs);
        let fs = self.for_path(&path)?;
        Ok((fs, path))
    }

    /// Filesystem serving an already-qualified path.
    ///
    /// # Errors
    /// Returns [`Error::Io`] (`Unsupported`) when no filesystem serves the scheme.
    pub fn for_path(&self, path: &FsPath) -> Result<Arc<dyn FileSystem>> {
        self.by_scheme.get(path.scheme()).cloned().ok_or_else(|| {
            Error::io(
                format!("resolve filesystem for {path}"),
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("No FileSystem for scheme: {}", path.scheme()),
                ),
            )
        })
    }
}

impl fmt::Debug for FileSystems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.by_scheme.keys().collect();
        schemes.sort();
        f.debug_struct("FileSystems")
            .field("schemes", &schemes)
            .field("default_fs", &self.default_fs.to_string())
            .finish()
    }
}

/// `NotFound` I/O error for `path`, shared by filesystem implementations.
pub(crate) fn not_found(path: &FsPath) -> Error {
    Error::io(
        format!("stat {path}"),
        io::Error::new(io::ErrorKind::NotFound, format!("File {path} does not exist")),
    )
}
