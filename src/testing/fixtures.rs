//! Input files and schemas for common testing scenarios.

use crate::format::{SequenceFileWriter, Writable, WritableKind};
use crate::io::compression::auto_detect_writer;
use crate::schema::{AttributeType, StreamSchema};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A short web-server-style log, one entry per line.
///
/// # Example
///
/// ```
/// use ironsplit::testing::sample_log_lines;
///
/// assert_eq!(sample_log_lines().len(), 6);
/// ```
#[must_use]
pub fn sample_log_lines() -> Vec<String> {
    [
        "192.168.1.100 GET /api/users 200 1024",
        "192.168.1.101 POST /api/users 201 512",
        "192.168.1.102 GET /api/posts 200 2048",
        "192.168.1.100 GET /api/users 404 256",
        "192.168.1.103 DELETE /api/posts 500 128",
        "",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `count` distinct lines of varying length (`line-0000 x`, `line-0001 xx`, ...).
#[must_use]
pub fn numbered_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("line-{i:04} {}", "x".repeat(i % 17 + 1)))
        .collect()
}

/// The `(offset, line)` records a text reader yields for `lines` joined with `\n`.
#[must_use]
pub fn expected_text_records(lines: &[String]) -> Vec<(i64, String)> {
    let mut offset = 0i64;
    lines
        .iter()
        .map(|line| {
            let rec = (offset, line.clone());
            offset += line.len() as i64 + 1;
            rec
        })
        .collect()
}

/// Write `lines`, each terminated by `\n`, to `dir/name`.
///
/// A name ending in a compression extension (`.gz`, `.zst`, ...) is written
/// compressed.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_text_file(dir: &Path, name: &str, lines: &[String]) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let mut out = auto_detect_writer(file, &path)?;
    for line in lines {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    drop(out);
    Ok(path)
}

/// Write a `LongWritable`/`Text` sequence file of `records` to `dir/name`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_sequence_file(dir: &Path, name: &str, records: &[(i64, String)]) -> Result<PathBuf> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let mut writer =
        SequenceFileWriter::new(BufWriter::new(file), WritableKind::Long, WritableKind::Text)?;
    for (k, v) in records {
        writer.append(&Writable::Long(*k), &Writable::Text(v.clone()))?;
    }
    writer
        .finish()?
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(path)
}

/// In-memory bytes of a `LongWritable`/`Text` sequence file.
///
/// # Errors
/// Returns an error if encoding fails.
pub fn sequence_file_bytes(records: &[(i64, String)]) -> Result<Vec<u8>> {
    let mut writer = SequenceFileWriter::new(Vec::new(), WritableKind::Long, WritableKind::Text)?;
    for (k, v) in records {
        writer.append(&Writable::Long(*k), &Writable::Text(v.clone()))?;
    }
    Ok(writer.finish()?)
}

/// `tuple<int64 key, rstring value>`.
#[must_use]
pub fn key_value_schema() -> StreamSchema {
    StreamSchema::key_value()
}

/// `tuple<int64 key>`.
#[must_use]
pub fn key_only_schema() -> StreamSchema {
    StreamSchema::new().with("key", AttributeType::Int64)
}

/// `tuple<rstring value>`.
#[must_use]
pub fn value_only_schema() -> StreamSchema {
    StreamSchema::new().with("value", AttributeType::RString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_offsets_account_for_newlines() {
        let lines = vec!["ab".to_string(), String::new(), "c".to_string()];
        assert_eq!(
            expected_text_records(&lines),
            vec![(0, "ab".into()), (3, String::new()), (4, "c".into())]
        );
    }

    #[test]
    fn sequence_bytes_start_with_magic() {
        let bytes = sequence_file_bytes(&[(1, "a".into())]).unwrap();
        assert_eq!(&bytes[..4], b"SEQ\x06");
    }
}
