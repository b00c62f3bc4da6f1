//! Line-oriented text input.
//!
//! Each record is one line: the key is the byte offset of the line's first
//! byte, the value is the line without its terminator. Lines end at `\n`,
//! `\r\n`, or `\r`, unless `textinputformat.record.delimiter` sets a custom
//! delimiter.
//!
//! Split boundaries rarely fall on line boundaries. A reader whose split does
//! not start at offset 0 discards everything up to and including the first
//! terminator, and every reader keeps reading while the next line *starts* at
//! or before its split end. Together these rules hand every line to exactly
//! one split.

use super::{FileSplit, Record, RecordReader, TaskContext, buffer_size};
use crate::config::{Configuration, keys};
use crate::error::{IoContext, Result};
use crate::fs::FsPath;
use crate::io::compression::{auto_detect_reader, codec_for_path};
use crate::runtime::CancellableRead;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use tracing::{debug, warn};

/// Text format settings resolved from configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextInputFormat {
    pub delimiter: Option<Vec<u8>>,
    pub max_line_length: usize,
}

impl TextInputFormat {
    /// # Errors
    /// [`Error::Config`](crate::Error::Config) if the max line length is not a number.
    pub fn from_conf(conf: &Configuration) -> Result<Self> {
        let delimiter = conf
            .get(keys::RECORD_DELIMITER)
            .filter(|d| !d.is_empty())
            .map(String::into_bytes);
        let max_line_length = conf.get_usize(keys::LINE_MAX_LENGTH, usize::MAX)?;
        Ok(Self {
            delimiter,
            max_line_length,
        })
    }

    /// Whether a reader starting mid-file can find the next record boundary.
    ///
    /// A delimiter that overlaps itself (`"\n\n"`, `"||"`, `"|~|"`) is
    /// ambiguous inside a run of delimiter bytes, so files using one are read
    /// as a single split.
    #[must_use]
    pub fn can_split(&self) -> bool {
        self.delimiter.as_deref().is_none_or(|d| !overlaps_itself(d))
    }
}

/// True if some proper prefix of `delim` is also a suffix of it.
fn overlaps_itself(delim: &[u8]) -> bool {
    (1..delim.len()).any(|k| delim[..k] == delim[delim.len() - k..])
}

/// Reads the lines belonging to one split.
pub struct LineRecordReader {
    input: Box<dyn BufRead + Send>,
    path: FsPath,
    start: u64,
    pos: u64,
    end: u64,
    delimiter: Option<Vec<u8>>,
    max_line_length: usize,
    line: Vec<u8>,
}

impl LineRecordReader {
    /// Open `split` and skip the partial first line when it starts mid-file.
    ///
    /// # Errors
    /// [`Error::Io`](crate::Error::Io) if the file cannot be opened or read.
    pub fn open(format: &TextInputFormat, split: &FileSplit, task: &TaskContext) -> Result<Self> {
        let fs = task.filesystems.for_path(&split.path)?;
        let mut raw = fs.open(&split.path)?;
        let capacity = buffer_size(&task.conf)?;

        let (input, mut start, end): (Box<dyn BufRead + Send>, u64, u64) =
            if codec_for_path(split.path.path()).is_some() {
                // Compressed files are one split read from the beginning; offsets
                // are positions in the decompressed stream.
                let decoded = auto_detect_reader(
                    CancellableRead::new(raw, task.token.clone()),
                    split.path.path(),
                )?;
                (
                    Box::new(BufReader::with_capacity(capacity, decoded)),
                    0,
                    u64::MAX,
                )
            } else {
                // A multi-byte delimiter may straddle the split start; back up so
                // the skipped partial line ends after it. Only delimiters that
                // cannot overlap themselves get here, so the first match is real.
                let backoff = match &format.delimiter {
                    Some(d) if split.start != 0 => split.start.min(d.len() as u64 - 1),
                    _ => 0,
                };
                let seek_to = split.start - backoff;
                raw.seek(SeekFrom::Start(seek_to))
                    .io_context(|| format!("seek {} to {seek_to}", split.path))?;
                (
                    Box::new(BufReader::with_capacity(
                        capacity,
                        CancellableRead::new(raw, task.token.clone()),
                    )),
                    seek_to,
                    split.end(),
                )
            };

        let mut reader = Self {
            input,
            path: split.path.clone(),
            start,
            pos: start,
            end,
            delimiter: format.delimiter.clone(),
            max_line_length: format.max_line_length,
            line: Vec::new(),
        };
        if split.start != 0 {
            start += reader.read_line()? as u64;
            reader.start = start;
            reader.pos = start;
        }
        debug!(split = %split, attempt = %task.attempt, first_line = start, "opened text split");
        Ok(reader)
    }

    /// Read one line into `self.line`; returns bytes consumed including the
    /// terminator (0 at end of input).
    fn read_line(&mut self) -> Result<usize> {
        self.line.clear();
        let path = &self.path;
        match &self.delimiter {
            None => read_default_line(&mut *self.input, &mut self.line),
            Some(delim) => read_delimited(&mut *self.input, delim, &mut self.line),
        }
        .io_context(|| format!("read {path}"))
    }
}

impl RecordReader for LineRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while self.pos <= self.end {
            let key = self.pos;
            let consumed = self.read_line()?;
            if consumed == 0 {
                return Ok(None);
            }
            self.pos += consumed as u64;
            if self.line.len() > self.max_line_length {
                warn!(
                    path = %self.path,
                    offset = key,
                    length = self.line.len(),
                    "skipped line longer than {}",
                    self.max_line_length
                );
                continue;
            }
            return Ok(Some(Record {
                key: key as i64,
                value: String::from_utf8_lossy(&self.line).into_owned(),
            }));
        }
        Ok(None)
    }

    fn bytes_consumed(&self) -> u64 {
        self.pos - self.start
    }
}

/// Line ending at `\n`, `\r\n`, or a lone `\r`.
fn read_default_line(input: &mut dyn BufRead, line: &mut Vec<u8>) -> io::Result<usize> {
    let mut consumed = 0;
    let mut after_cr = false;
    loop {
        let available = input.fill_buf()?;
        if available.is_empty() {
            return Ok(consumed);
        }
        if after_cr {
            if available[0] == b'\n' {
                input.consume(1);
                consumed += 1;
            }
            return Ok(consumed);
        }
        let (used, terminator) = match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) => {
                line.extend_from_slice(&available[..i]);
                (i + 1, Some(available[i]))
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), None)
            }
        };
        input.consume(used);
        consumed += used;
        match terminator {
            Some(b'\n') => return Ok(consumed),
            Some(_) => after_cr = true,
            None => {}
        }
    }
}

/// Line ending at a custom byte sequence.
fn read_delimited(input: &mut dyn BufRead, delim: &[u8], line: &mut Vec<u8>) -> io::Result<usize> {
    let Some(&last) = delim.last() else {
        return read_default_line(input, line);
    };
    let mut consumed = 0;
    loop {
        let n = input.read_until(last, line)?;
        consumed += n;
        if n == 0 || line.last() != Some(&last) {
            return Ok(consumed);
        }
        if line.ends_with(delim) {
            line.truncate(line.len() - delim.len());
            return Ok(consumed);
        }
    }
}
