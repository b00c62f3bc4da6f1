//! Input formats: how files become splits and how a split becomes records.
//!
//! Two formats are built in:
//!
//! | [`FileType`] | Splits | Records |
//! |---|---|---|
//! | `text` | block-sized; compressed files whole | one per line, key = byte offset |
//! | `sequence` | block-sized, at least [`sequence::SYNC_INTERVAL`] | one per stored key/value pair |
//!
//! Both produce [`Record`]s with an `i64` key and a `String` value, which the
//! operator maps onto the output schema.

pub mod sequence;
pub mod split;
pub mod text;
pub mod writable;

pub use sequence::{SequenceFileReader, SequenceFileWriter, SequenceRecordReader};
pub use split::{FileSplit, SplitBounds, compute_splits, list_input_files};
pub use text::LineRecordReader;
pub use writable::{Writable, WritableKind};

use crate::config::{Configuration, keys};
use crate::error::{Error, Result};
use crate::fs::{FileSystems, FsPath};
use crate::io::compression::codec_for_path;
use crate::runtime::CancellationToken;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which input format the reader uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    #[default]
    Text,
    Sequence,
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "sequence" => Ok(Self::Sequence),
            other => Err(Error::config(format!(
                "invalid fileType {other:?}, expected \"text\" or \"sequence\""
            ))),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Sequence => "sequence",
        })
    }
}

/// One record read from a split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: i64,
    pub value: String,
}

/// Sequential reader over the records of a single split.
///
/// Readers are created per split, used once, and dropped before the next
/// split is opened; dropping releases the underlying file handle.
pub trait RecordReader: Send {
    /// The next record, or `None` once the split is exhausted.
    ///
    /// # Errors
    /// [`Error::Io`] or [`Error::Format`] on read failure, [`Error::Cancelled`]
    /// after shutdown.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Bytes of input consumed so far.
    fn bytes_consumed(&self) -> u64;
}

/// Per-split execution context handed to record readers.
#[derive(Clone)]
pub struct TaskContext {
    pub conf: Arc<Configuration>,
    pub filesystems: Arc<FileSystems>,
    pub token: CancellationToken,
    pub attempt: TaskAttemptId,
}

/// Identifies which channel is reading which split; used in log fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskAttemptId {
    pub channel: usize,
    pub max_channels: usize,
    pub split: usize,
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt_c{:03}of{:03}_s{:06}",
            self.channel, self.max_channels, self.split
        )
    }
}

/// The selected input format with its configuration resolved.
#[derive(Clone, Debug)]
pub enum InputFormat {
    Text(text::TextInputFormat),
    Sequence(sequence::SequenceInputFormat),
}

impl InputFormat {
    /// Resolve the format for `file_type` from `conf`.
    ///
    /// # Errors
    /// [`Error::Config`] if a format-specific key has an invalid value.
    pub fn new(file_type: FileType, conf: &Configuration) -> Result<Self> {
        Ok(match file_type {
            FileType::Text => Self::Text(text::TextInputFormat::from_conf(conf)?),
            FileType::Sequence => Self::Sequence(sequence::SequenceInputFormat),
        })
    }

    #[must_use]
    pub fn file_type(&self) -> FileType {
        match self {
            Self::Text(_) => FileType::Text,
            Self::Sequence(_) => FileType::Sequence,
        }
    }

    /// Smallest split this format accepts.
    #[must_use]
    pub fn min_split_size(&self) -> u64 {
        match self {
            Self::Text(_) => 1,
            Self::Sequence(_) => sequence::SYNC_INTERVAL,
        }
    }

    /// Whether a file may be cut into several splits.
    #[must_use]
    pub fn is_splittable(&self, path: &FsPath) -> bool {
        match self {
            Self::Text(text) => text.can_split() && codec_for_path(path.path()).is_none(),
            Self::Sequence(_) => true,
        }
    }

    /// List `inputs` and compute the ordered split list.
    ///
    /// # Errors
    /// [`Error::Io`] if listing fails, [`Error::Config`] for bad size keys.
    pub fn compute_splits(
        &self,
        inputs: &[String],
        conf: &Configuration,
        filesystems: &FileSystems,
    ) -> Result<Vec<FileSplit>> {
        let files = list_input_files(inputs, conf, filesystems)?;
        let bounds = SplitBounds::from_conf(conf, self.min_split_size())?;
        Ok(compute_splits(&files, bounds, |p| self.is_splittable(p)))
    }

    /// Open a reader positioned at the first record of `split`.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be opened, [`Error::Format`] if its
    /// header is unusable.
    pub fn create_record_reader(
        &self,
        split: &FileSplit,
        task: &TaskContext,
    ) -> Result<Box<dyn RecordReader>> {
        Ok(match self {
            Self::Text(format) => Box::new(LineRecordReader::open(format, split, task)?),
            Self::Sequence(_) => Box::new(SequenceRecordReader::open(split, task)?),
        })
    }
}

/// `io.file.buffer.size`, used to size read buffers.
pub(crate) fn buffer_size(conf: &Configuration) -> Result<usize> {
    Ok(conf.get_usize(keys::IO_FILE_BUFFER_SIZE, 64 * 1024)?.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_parses_case_insensitively() {
        assert_eq!("TEXT".parse::<FileType>().unwrap(), FileType::Text);
        assert_eq!("sequence".parse::<FileType>().unwrap(), FileType::Sequence);
        assert!(matches!("avro".parse::<FileType>(), Err(Error::Config(_))));
    }

    #[test]
    fn compressed_text_is_not_splittable() {
        let format = InputFormat::new(FileType::Text, &Configuration::new()).unwrap();
        assert!(format.is_splittable(&FsPath::parse("/a/b.txt")));
        #[cfg(feature = "compression-gzip")]
        assert!(!format.is_splittable(&FsPath::parse("/a/b.txt.gz")));
    }

    #[test]
    fn overlapping_delimiter_is_not_splittable() {
        let conf = Configuration::builder()
            .set(keys::RECORD_DELIMITER, "\n\n")
            .build()
            .unwrap();
        let format = InputFormat::new(FileType::Text, &conf).unwrap();
        assert!(!format.is_splittable(&FsPath::parse("/a/b.txt")));

        let conf = Configuration::builder()
            .set(keys::RECORD_DELIMITER, "<EOR>")
            .build()
            .unwrap();
        let format = InputFormat::new(FileType::Text, &conf).unwrap();
        assert!(format.is_splittable(&FsPath::parse("/a/b.txt")));
    }

    #[test]
    fn attempt_id_display() {
        let id = TaskAttemptId {
            channel: 1,
            max_channels: 4,
            split: 12,
        };
        assert_eq!(id.to_string(), "attempt_c001of004_s000012");
    }
}
