//! Binary sequence files of key/value pairs.
//!
//! Layout (uncompressed, version 6):
//!
//! ```text
//! "SEQ" version:u8
//! key-class:text value-class:text
//! compressed:u8 block-compressed:u8
//! metadata-count:i32 (name:text value:text)*
//! sync:[u8; 16]
//! ( record | -1:i32 sync:[u8; 16] )*
//! record = record-len:i32 key-len:i32 key-bytes value-bytes
//! ```
//!
//! Writers emit a sync marker roughly every [`SYNC_INTERVAL`] bytes. A reader
//! for a split starting mid-file scans forward to the next marker; a reader
//! stops after it crosses its split end *and* has passed a marker, since the
//! following record belongs to the next split.

use super::writable::{Writable, WritableKind, read_vlong, write_text};
use super::{FileSplit, Record, RecordReader, TaskContext, buffer_size};
use crate::error::{Error, IoContext, Result};
use crate::fs::FsPath;
use crate::runtime::CancellableRead;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use tracing::{debug, trace};

const MAGIC: &[u8; 3] = b"SEQ";
const VERSION: u8 = 6;
const VERSION_WITH_BLOCK_COMPRESSION: u8 = 4;
const VERSION_WITH_METADATA: u8 = 6;
const MIN_VERSION: u8 = 3;
const SYNC_ESCAPE: i32 = -1;
const SYNC_HASH_SIZE: usize = 16;
const SYNC_SIZE: u64 = 4 + SYNC_HASH_SIZE as u64;

/// Bytes between sync markers written by [`SequenceFileWriter`]; also the
/// minimum split size for sequence input.
pub const SYNC_INTERVAL: u64 = 100 * SYNC_SIZE;

/// Marker type for the sequence input format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceInputFormat;

/// Parsed file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceHeader {
    pub version: u8,
    pub key_class: String,
    pub value_class: String,
    pub metadata: Vec<(String, String)>,
    pub sync: [u8; SYNC_HASH_SIZE],
}

/// Byte source that remembers its absolute position.
struct Positioned<R> {
    inner: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> Positioned<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    fn read_text(&mut self) -> io::Result<String> {
        // A vint is at most 9 bytes; read the prefix byte first to size it.
        let first = self.read_u8()?;
        let mut prefix = vec![first];
        let extra = match first as i8 {
            v if v >= -112 => 0,
            v if v < -120 => (-120 - i32::from(v)) as usize,
            v => (-112 - i32::from(v)) as usize,
        };
        let mut rest = vec![0u8; extra];
        self.read_exact(&mut rest)?;
        prefix.extend_from_slice(&rest);
        let (len, _) = read_vlong(&prefix)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative text length"))?;
        let mut data = vec![0u8; len];
        self.read_exact(&mut data)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }
}

/// Low-level reader over a whole sequence file.
pub struct SequenceFileReader<R> {
    input: Positioned<R>,
    path: FsPath,
    header: SequenceHeader,
    key_kind: WritableKind,
    value_kind: WritableKind,
    header_end: u64,
    file_len: u64,
    sync_seen: bool,
    record: Vec<u8>,
}

impl<R: Read + Seek> SequenceFileReader<R> {
    /// Parse the header of a file of `file_len` bytes.
    ///
    /// # Errors
    /// [`Error::Format`] if the header is not a readable, uncompressed
    /// sequence header or the key type is not an integer writable.
    pub fn new(input: R, path: FsPath, file_len: u64, buffer_size: usize) -> Result<Self> {
        let mut input = Positioned {
            inner: BufReader::with_capacity(buffer_size, input),
            pos: 0,
        };
        let header = read_header(&mut input, &path)?;
        let key_kind = WritableKind::from_class_name(&header.key_class)
            .filter(|k| k.is_integer())
            .ok_or_else(|| {
                Error::format(format!(
                    "{path}: key class {} is not an integer writable",
                    header.key_class
                ))
            })?;
        let value_kind = WritableKind::from_class_name(&header.value_class).ok_or_else(|| {
            Error::format(format!(
                "{path}: unsupported value class {}",
                header.value_class
            ))
        })?;
        let header_end = input.pos;
        trace!(%path, header_end, key = %header.key_class, value = %header.value_class, "read sequence header");
        Ok(Self {
            input,
            path,
            header,
            key_kind,
            value_kind,
            header_end,
            file_len,
            sync_seen: false,
            record: Vec::new(),
        })
    }

    #[must_use]
    pub fn header(&self) -> &SequenceHeader {
        &self.header
    }

    /// Current byte position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.input.pos
    }

    /// Whether the last [`next`](Self::next) passed a sync marker.
    #[must_use]
    pub fn sync_seen(&self) -> bool {
        self.sync_seen
    }

    /// Position at the first sync marker at or after `position`, or at end of
    /// file when there is none. Positions inside the header go to the first
    /// record.
    ///
    /// # Errors
    /// [`Error::Io`] on read failure.
    pub fn sync(&mut self, position: u64) -> Result<()> {
        let path = &self.path;
        if position + SYNC_SIZE >= self.file_len {
            self.input
                .seek_to(self.file_len)
                .io_context(|| format!("seek {path}"))?;
            return Ok(());
        }
        if position < self.header_end {
            self.input
                .seek_to(self.header_end)
                .io_context(|| format!("seek {path}"))?;
            self.sync_seen = true;
            return Ok(());
        }

        self.input
            .seek_to(position + 4)
            .io_context(|| format!("seek {path}"))?;
        let mut window = [0u8; SYNC_HASH_SIZE];
        self.input
            .read_exact(&mut window)
            .io_context(|| format!("read {path}"))?;
        let sync = self.header.sync;
        let mut i = 0usize;
        while self.input.pos < self.file_len {
            let matched = (0..SYNC_HASH_SIZE).all(|j| sync[j] == window[(i + j) % SYNC_HASH_SIZE]);
            if matched {
                let escape_at = self.input.pos - SYNC_SIZE;
                self.input
                    .seek_to(escape_at)
                    .io_context(|| format!("seek {path}"))?;
                return Ok(());
            }
            window[i % SYNC_HASH_SIZE] = self.input.read_u8().io_context(|| format!("read {path}"))?;
            i += 1;
        }
        Ok(())
    }

    /// Read the next key/value pair, or `None` at end of file.
    ///
    /// # Errors
    /// [`Error::Format`] for corrupt records, [`Error::Io`] on read failure.
    pub fn next(&mut self) -> Result<Option<(Writable, Writable)>> {
        let path = &self.path;
        if self.input.pos >= self.file_len {
            return Ok(None);
        }
        let mut length = self.input.read_i32().io_context(|| format!("read {path}"))?;
        if length == SYNC_ESCAPE {
            let mut check = [0u8; SYNC_HASH_SIZE];
            self.input
                .read_exact(&mut check)
                .io_context(|| format!("read {path}"))?;
            if check != self.header.sync {
                return Err(Error::format(format!(
                    "{path}: corrupt sync marker at {}",
                    self.input.pos - SYNC_HASH_SIZE as u64
                )));
            }
            self.sync_seen = true;
            if self.input.pos >= self.file_len {
                return Ok(None);
            }
            length = self.input.read_i32().io_context(|| format!("read {path}"))?;
        } else {
            self.sync_seen = false;
        }

        let key_len = self.input.read_i32().io_context(|| format!("read {path}"))?;
        let (Ok(length), Ok(key_len)) = (usize::try_from(length), usize::try_from(key_len)) else {
            return Err(Error::format(format!(
                "{path}: negative record length at {}",
                self.input.pos
            )));
        };
        if key_len > length {
            return Err(Error::format(format!(
                "{path}: key length {key_len} exceeds record length {length}"
            )));
        }
        self.record.resize(length, 0);
        self.input
            .read_exact(&mut self.record)
            .io_context(|| format!("read {path}"))?;
        let key = Writable::decode(self.key_kind, &self.record[..key_len])?;
        let value = Writable::decode(self.value_kind, &self.record[key_len..])?;
        Ok(Some((key, value)))
    }
}

fn read_header<R: Read + Seek>(input: &mut Positioned<R>, path: &FsPath) -> Result<SequenceHeader> {
    let bad = |what: &str| Error::format(format!("{path}: {what}"));
    let mut magic = [0u8; 3];
    input
        .read_exact(&mut magic)
        .map_err(|_| bad("not a sequence file (too short)"))?;
    if &magic != MAGIC {
        return Err(bad("not a sequence file (bad magic)"));
    }
    let version = input.read_u8().map_err(|_| bad("truncated header"))?;
    if !(MIN_VERSION..=VERSION).contains(&version) {
        return Err(bad(&format!("unsupported sequence file version {version}")));
    }
    let key_class = input.read_text().map_err(|_| bad("truncated header"))?;
    let value_class = input.read_text().map_err(|_| bad("truncated header"))?;
    let compressed = input.read_u8().map_err(|_| bad("truncated header"))? != 0;
    let block_compressed = version >= VERSION_WITH_BLOCK_COMPRESSION
        && input.read_u8().map_err(|_| bad("truncated header"))? != 0;
    if compressed || block_compressed {
        return Err(bad("compressed sequence files are not supported"));
    }
    let mut metadata = Vec::new();
    if version >= VERSION_WITH_METADATA {
        let count = input.read_i32().map_err(|_| bad("truncated header"))?;
        let count = usize::try_from(count).map_err(|_| bad("negative metadata count"))?;
        for _ in 0..count {
            let name = input.read_text().map_err(|_| bad("truncated metadata"))?;
            let value = input.read_text().map_err(|_| bad("truncated metadata"))?;
            metadata.push((name, value));
        }
    }
    let mut sync = [0u8; SYNC_HASH_SIZE];
    input
        .read_exact(&mut sync)
        .map_err(|_| bad("truncated header"))?;
    Ok(SequenceHeader {
        version,
        key_class,
        value_class,
        metadata,
        sync,
    })
}

/// Record reader for one split of a sequence file.
pub struct SequenceRecordReader {
    reader: SequenceFileReader<CancellableRead<Box<dyn crate::fs::SeekRead>>>,
    start: u64,
    end: u64,
    more: bool,
}

impl SequenceRecordReader {
    /// Open the file and move to the first record owned by `split`.
    ///
    /// # Errors
    /// [`Error::Io`] or [`Error::Format`] as for [`SequenceFileReader::new`].
    pub fn open(split: &FileSplit, task: &TaskContext) -> Result<Self> {
        let fs = task.filesystems.for_path(&split.path)?;
        let file_len = fs.status(&split.path)?.len;
        let raw = fs.open(&split.path)?;
        let mut reader = SequenceFileReader::new(
            CancellableRead::new(raw, task.token.clone()),
            split.path.clone(),
            file_len,
            buffer_size(&task.conf)?,
        )?;
        let end = split.end();
        if split.start > reader.position() {
            reader.sync(split.start)?;
        }
        let start = reader.position();
        debug!(split = %split, attempt = %task.attempt, first_record = start, "opened sequence split");
        Ok(Self {
            reader,
            start,
            end,
            more: start < end,
        })
    }
}

impl RecordReader for SequenceRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.more {
            return Ok(None);
        }
        let pos = self.reader.position();
        let next = self.reader.next()?;
        self.more = next.is_some() && !(pos >= self.end && self.reader.sync_seen());
        if !self.more {
            return Ok(None);
        }
        let Some((key, value)) = next else {
            return Ok(None);
        };
        let key = key.as_i64().ok_or_else(|| {
            Error::format(format!("non-integer key {} in {}", key, self.reader.path))
        })?;
        Ok(Some(Record {
            key,
            value: value.to_string(),
        }))
    }

    fn bytes_consumed(&self) -> u64 {
        self.reader.position().saturating_sub(self.start)
    }
}

/// Writes uncompressed sequence files, inserting sync markers every
/// [`SYNC_INTERVAL`] bytes.
pub struct SequenceFileWriter<W: Write> {
    out: W,
    key_kind: WritableKind,
    value_kind: WritableKind,
    sync: [u8; SYNC_HASH_SIZE],
    pos: u64,
    last_sync: u64,
    buf: Vec<u8>,
}

impl<W: Write> SequenceFileWriter<W> {
    /// Start a file with a random sync marker.
    ///
    /// # Errors
    /// [`Error::Io`] if the header cannot be written.
    pub fn new(out: W, key_kind: WritableKind, value_kind: WritableKind) -> Result<Self> {
        Self::with_options(out, key_kind, value_kind, &[], random_sync())
    }

    /// Start a file with explicit metadata and sync marker.
    ///
    /// # Errors
    /// [`Error::Io`] if the header cannot be written.
    pub fn with_options(
        out: W,
        key_kind: WritableKind,
        value_kind: WritableKind,
        metadata: &[(String, String)],
        sync: [u8; SYNC_HASH_SIZE],
    ) -> Result<Self> {
        let mut header = Vec::new();
        header.extend_from_slice(MAGIC);
        header.push(VERSION);
        write_text(&mut header, key_kind.class_name());
        write_text(&mut header, value_kind.class_name());
        header.push(0);
        header.push(0);
        header.extend_from_slice(&(metadata.len() as i32).to_be_bytes());
        for (name, value) in metadata {
            write_text(&mut header, name);
            write_text(&mut header, value);
        }
        header.extend_from_slice(&sync);

        let mut writer = Self {
            out,
            key_kind,
            value_kind,
            sync,
            pos: 0,
            last_sync: 0,
            buf: Vec::new(),
        };
        writer.write_raw(&header)?;
        Ok(writer)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out
            .write_all(bytes)
            .io_context(|| "write sequence file")?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    /// Write a sync marker unless one was just written.
    ///
    /// # Errors
    /// [`Error::Io`] on write failure.
    pub fn sync(&mut self) -> Result<()> {
        if self.last_sync != self.pos {
            let mut marker = Vec::with_capacity(SYNC_SIZE as usize);
            marker.extend_from_slice(&SYNC_ESCAPE.to_be_bytes());
            marker.extend_from_slice(&self.sync);
            self.write_raw(&marker)?;
            self.last_sync = self.pos;
        }
        Ok(())
    }

    /// Append one key/value pair.
    ///
    /// # Errors
    /// [`Error::Format`] if the value kinds do not match the header,
    /// [`Error::Io`] on write failure.
    pub fn append(&mut self, key: &Writable, value: &Writable) -> Result<()> {
        if key.kind() != self.key_kind || value.kind() != self.value_kind {
            return Err(Error::format(format!(
                "expected {}/{}, got {}/{}",
                self.key_kind.class_name(),
                self.value_kind.class_name(),
                key.kind().class_name(),
                value.kind().class_name()
            )));
        }
        if self.pos >= self.last_sync + SYNC_INTERVAL {
            self.sync()?;
        }
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        buf.extend_from_slice(&[0u8; 8]);
        key.encode(&mut buf);
        let key_len = buf.len() - 8;
        value.encode(&mut buf);
        let record_len = buf.len() - 8;
        buf[..4].copy_from_slice(&(record_len as i32).to_be_bytes());
        buf[4..8].copy_from_slice(&(key_len as i32).to_be_bytes());
        let res = self.write_raw(&buf);
        self.buf = buf;
        res
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush().io_context(|| "flush sequence file")?;
        Ok(self.out)
    }
}

fn random_sync() -> [u8; SYNC_HASH_SIZE] {
    let mut sync = [0u8; SYNC_HASH_SIZE];
    for chunk in sync.chunks_mut(8) {
        let mut h = RandomState::new().build_hasher();
        h.write_u128(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default(),
        );
        chunk.copy_from_slice(&h.finish().to_be_bytes());
    }
    sync
}
