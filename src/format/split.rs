//! Input listing and split computation.
//!
//! The input paths (files, directories, or glob patterns) are listed once,
//! then every file is cut into byte ranges:
//!
//! ```text
//! split_size = max(min_size, min(max_size, block_size))
//! ```
//!
//! A file is cut into `split_size` pieces while the remainder is more than
//! [`SPLIT_SLOP`] times the split size, so the last split can be up to 10%
//! larger than the others. Files that cannot be split (compressed text) become
//! one split each, and an empty file still produces one empty split. Split
//! indices are dense, start at 0, and follow input order then byte order.

use crate::config::{Configuration, keys};
use crate::error::{Error, Result};
use crate::fs::{FileStatus, FileSystems, FsPath};
use std::fmt;
use std::io;
use tracing::{debug, trace};

/// The last split may exceed the split size by this factor.
pub const SPLIT_SLOP: f64 = 1.1;

/// A contiguous byte range `[start, start + length)` of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSplit {
    pub index: usize,
    pub path: FsPath,
    pub start: u64,
    pub length: u64,
}

impl FileSplit {
    /// Exclusive end offset.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

impl fmt::Display for FileSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}+{}", self.path, self.start, self.length)
    }
}

/// Names starting with `_` or `.` (e.g. `_SUCCESS`, `.crc` files) are skipped
/// when listing directories and expanding globs.
#[must_use]
pub fn is_hidden(path: &FsPath) -> bool {
    let name = path.name();
    name.starts_with('_') || name.starts_with('.')
}

/// List every input file named by `inputs`, in input order.
///
/// Directories contribute their visible files; nested directories are only
/// descended into when `mapreduce.input.fileinputformat.input.dir.recursive`
/// is true. With `list-status.num-threads > 1` the inputs are listed in
/// parallel (feature `parallel-io`) without changing the result order.
///
/// # Errors
/// [`Error::Io`] when an input does not exist, a glob matches nothing, or a
/// listing fails.
pub fn list_input_files(
    inputs: &[String],
    conf: &Configuration,
    filesystems: &FileSystems,
) -> Result<Vec<FileStatus>> {
    if inputs.is_empty() {
        return Err(Error::config("no input paths specified"));
    }
    let recursive = conf.get_bool(keys::INPUT_DIR_RECURSIVE, false)?;
    let threads = conf.get_usize(keys::LIST_STATUS_NUM_THREADS, 1)?.max(1);

    let per_input: Vec<Vec<FileStatus>> = if threads > 1 && inputs.len() > 1 {
        list_parallel(inputs, threads, recursive, filesystems)?
    } else {
        inputs
            .iter()
            .map(|input| list_one(input, recursive, filesystems))
            .collect::<Result<_>>()?
    };
    let files: Vec<FileStatus> = per_input.into_iter().flatten().collect();
    debug!(inputs = inputs.len(), files = files.len(), "listed input files");
    Ok(files)
}

#[cfg(feature = "parallel-io")]
fn list_parallel(
    inputs: &[String],
    threads: usize,
    recursive: bool,
    filesystems: &FileSystems,
) -> Result<Vec<Vec<FileStatus>>> {
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::config(format!("cannot build listing pool: {e}")))?;
    pool.install(|| {
        inputs
            .par_iter()
            .map(|input| list_one(input, recursive, filesystems))
            .collect()
    })
}

#[cfg(not(feature = "parallel-io"))]
fn list_parallel(
    inputs: &[String],
    _threads: usize,
    recursive: bool,
    filesystems: &FileSystems,
) -> Result<Vec<Vec<FileStatus>>> {
    inputs
        .iter()
        .map(|input| list_one(input, recursive, filesystems))
        .collect()
}

fn list_one(input: &str, recursive: bool, filesystems: &FileSystems) -> Result<Vec<FileStatus>> {
    let (fs, path) = filesystems.resolve(input)?;
    let matches = if path.has_glob() {
        let found: Vec<FileStatus> = fs
            .glob(&path)?
            .into_iter()
            .filter(|s| !is_hidden(&s.path))
            .collect();
        if found.is_empty() {
            return Err(Error::io(
                format!("list {path}"),
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Input Pattern {path} matches 0 files"),
                ),
            ));
        }
        found
    } else {
        if !fs.exists(&path)? {
            return Err(Error::io(
                format!("list {path}"),
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Input path does not exist: {path}"),
                ),
            ));
        }
        vec![fs.status(&path)?]
    };

    let mut out = Vec::new();
    for status in matches {
        if status.is_dir {
            collect_dir(&*fs, &status.path, recursive, &mut out)?;
        } else {
            out.push(status);
        }
    }
    Ok(out)
}

fn collect_dir(
    fs: &dyn crate::fs::FileSystem,
    dir: &FsPath,
    recursive: bool,
    out: &mut Vec<FileStatus>,
) -> Result<()> {
    for child in fs.list(dir)? {
        if is_hidden(&child.path) {
            trace!(path = %child.path, "skipping hidden entry");
            continue;
        }
        if !child.is_dir {
            out.push(child);
        } else if recursive {
            collect_dir(fs, &child.path, recursive, out)?;
        } else {
            debug!(path = %child.path, "skipping subdirectory (recursion disabled)");
        }
    }
    Ok(())
}

/// Split sizing bounds for one format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitBounds {
    pub min_size: u64,
    pub max_size: u64,
}

impl SplitBounds {
    /// Bounds from configuration, with `format_min` as a floor under the
    /// configured minimum.
    ///
    /// # Errors
    /// [`Error::Config`] if a size key is not a number.
    pub fn from_conf(conf: &Configuration, format_min: u64) -> Result<Self> {
        let min_size = format_min.max(conf.get_u64(keys::SPLIT_MINSIZE, 1)?);
        let max_size = conf.get_u64(keys::SPLIT_MAXSIZE, i64::MAX as u64)?;
        Ok(Self { min_size, max_size })
    }

    #[must_use]
    pub fn split_size(&self, block_size: u64) -> u64 {
        self.min_size.max(self.max_size.min(block_size)).max(1)
    }
}

/// Cut listed files into splits.
pub fn compute_splits<F>(files: &[FileStatus], bounds: SplitBounds, is_splittable: F) -> Vec<FileSplit>
where
    F: Fn(&FsPath) -> bool,
{
    let mut splits = Vec::new();
    let mut push = |path: &FsPath, start: u64, length: u64| {
        splits.push(FileSplit {
            index: splits.len(),
            path: path.clone(),
            start,
            length,
        });
    };

    for file in files {
        if file.len == 0 {
            push(&file.path, 0, 0);
        } else if is_splittable(&file.path) {
            let split_size = bounds.split_size(file.block_size);
            let mut remaining = file.len;
            while remaining as f64 / split_size as f64 > SPLIT_SLOP {
                push(&file.path, file.len - remaining, split_size);
                remaining -= split_size;
            }
            if remaining != 0 {
                push(&file.path, file.len - remaining, remaining);
            }
        } else {
            push(&file.path, 0, file.len);
        }
    }
    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(path: &str, len: u64, block_size: u64) -> FileStatus {
        FileStatus {
            path: FsPath::parse(path),
            len,
            is_dir: false,
            block_size,
        }
    }

    const BOUNDS: SplitBounds = SplitBounds {
        min_size: 1,
        max_size: i64::MAX as u64,
    };

    #[test]
    fn slop_merges_small_tail() {
        // 105 bytes over 100-byte blocks: 1.05 <= 1.1, so one split.
        let splits = compute_splits(&[status("mem:///a", 105, 100)], BOUNDS, |_| true);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].length, 105);

        let splits = compute_splits(&[status("mem:///a", 250, 100)], BOUNDS, |_| true);
        let ranges: Vec<_> = splits.iter().map(|s| (s.start, s.length)).collect();
        assert_eq!(ranges, vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[test]
    fn empty_file_still_gets_a_split() {
        let splits = compute_splits(&[status("mem:///empty", 0, 100)], BOUNDS, |_| true);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].length, 0);
    }

    #[test]
    fn unsplittable_files_are_whole() {
        let splits = compute_splits(&[status("mem:///a.gz", 1000, 100)], BOUNDS, |_| false);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].to_string(), "mem:///a.gz:0+1000");
    }

    #[test]
    fn indices_are_dense_across_files() {
        let files = [status("mem:///a", 300, 100), status("mem:///b", 50, 100)];
        let splits = compute_splits(&files, BOUNDS, |_| true);
        let idx: Vec<_> = splits.iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![0, 1, 2, 3]);
        assert_eq!(splits[3].path.to_string(), "mem:///b");
    }

    #[test]
    fn min_size_wins_over_block_size() {
        let bounds = SplitBounds {
            min_size: 2000,
            max_size: i64::MAX as u64,
        };
        assert_eq!(bounds.split_size(100), 2000);
    }

    #[test]
    fn hidden_names() {
        assert!(is_hidden(&FsPath::parse("/d/_SUCCESS")));
        assert!(is_hidden(&FsPath::parse("/d/.part.crc")));
        assert!(!is_hidden(&FsPath::parse("/d/part-0")));
    }
}
