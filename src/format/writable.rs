//! Serialized key/value types stored in sequence files.
//!
//! Encodings follow the classic writable layouts: fixed-width big-endian
//! integers and floats, zero-compressed variable-length integers ("vints"),
//! vint-prefixed UTF-8 text, and int-prefixed byte arrays.

use crate::error::{Error, Result};
use std::fmt;

/// Writable classes this crate can decode, identified by their class names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WritableKind {
    Long,
    Int,
    VLong,
    VInt,
    Text,
    Boolean,
    Double,
    Float,
    Bytes,
    Null,
}

impl WritableKind {
    const ALL: [WritableKind; 10] = [
        Self::Long,
        Self::Int,
        Self::VLong,
        Self::VInt,
        Self::Text,
        Self::Boolean,
        Self::Double,
        Self::Float,
        Self::Bytes,
        Self::Null,
    ];

    #[must_use]
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Long => "org.apache.hadoop.io.LongWritable",
            Self::Int => "org.apache.hadoop.io.IntWritable",
            Self::VLong => "org.apache.hadoop.io.VLongWritable",
            Self::VInt => "org.apache.hadoop.io.VIntWritable",
            Self::Text => "org.apache.hadoop.io.Text",
            Self::Boolean => "org.apache.hadoop.io.BooleanWritable",
            Self::Double => "org.apache.hadoop.io.DoubleWritable",
            Self::Float => "org.apache.hadoop.io.FloatWritable",
            Self::Bytes => "org.apache.hadoop.io.BytesWritable",
            Self::Null => "org.apache.hadoop.io.NullWritable",
        }
    }

    #[must_use]
    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.class_name() == name)
    }

    /// Kinds whose values convert losslessly to `i64`.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Long | Self::Int | Self::VLong | Self::VInt)
    }
}

/// A decoded writable value.
#[derive(Clone, Debug, PartialEq)]
pub enum Writable {
    Long(i64),
    Int(i32),
    VLong(i64),
    VInt(i32),
    Text(String),
    Boolean(bool),
    Double(f64),
    Float(f32),
    Bytes(Vec<u8>),
    Null,
}

impl Writable {
    #[must_use]
    pub fn kind(&self) -> WritableKind {
        match self {
            Self::Long(_) => WritableKind::Long,
            Self::Int(_) => WritableKind::Int,
            Self::VLong(_) => WritableKind::VLong,
            Self::VInt(_) => WritableKind::VInt,
            Self::Text(_) => WritableKind::Text,
            Self::Boolean(_) => WritableKind::Boolean,
            Self::Double(_) => WritableKind::Double,
            Self::Float(_) => WritableKind::Float,
            Self::Bytes(_) => WritableKind::Bytes,
            Self::Null => WritableKind::Null,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(v) | Self::VLong(v) => Some(*v),
            Self::Int(v) | Self::VInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Decode one value of `kind` that occupies exactly `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::Format`] if the bytes are truncated or have trailing data.
    pub fn decode(kind: WritableKind, bytes: &[u8]) -> Result<Self> {
        let (value, used) = match kind {
            WritableKind::Long => (Self::Long(i64::from_be_bytes(fixed(bytes)?)), 8),
            WritableKind::Int => (Self::Int(i32::from_be_bytes(fixed(bytes)?)), 4),
            WritableKind::Double => (Self::Double(f64::from_be_bytes(fixed(bytes)?)), 8),
            WritableKind::Float => (Self::Float(f32::from_be_bytes(fixed(bytes)?)), 4),
            WritableKind::Boolean => {
                let b = *bytes
                    .first()
                    .ok_or_else(|| Error::format("truncated BooleanWritable"))?;
                (Self::Boolean(b != 0), 1)
            }
            WritableKind::VLong => {
                let (v, n) = read_vlong(bytes)?;
                (Self::VLong(v), n)
            }
            WritableKind::VInt => {
                let (v, n) = read_vlong(bytes)?;
                let v = i32::try_from(v).map_err(|_| Error::format("VIntWritable out of range"))?;
                (Self::VInt(v), n)
            }
            WritableKind::Text => {
                let (s, n) = read_text(bytes)?;
                (Self::Text(s), n)
            }
            WritableKind::Bytes => {
                let len: [u8; 4] = fixed(bytes)?;
                let len = usize::try_from(i32::from_be_bytes(len))
                    .map_err(|_| Error::format("negative BytesWritable length"))?;
                let data = bytes
                    .get(4..4 + len)
                    .ok_or_else(|| Error::format("truncated BytesWritable"))?;
                (Self::Bytes(data.to_vec()), 4 + len)
            }
            WritableKind::Null => (Self::Null, 0),
        };
        if used != bytes.len() {
            return Err(Error::format(format!(
                "{} used {used} of {} bytes",
                kind.class_name(),
                bytes.len()
            )));
        }
        Ok(value)
    }

    /// Append the serialized form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::VLong(v) => write_vlong(out, *v),
            Self::VInt(v) => write_vlong(out, i64::from(*v)),
            Self::Text(s) => write_text(out, s),
            Self::Boolean(b) => out.push(u8::from(*b)),
            Self::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Bytes(b) => {
                let len = i32::try_from(b.len()).unwrap_or(i32::MAX);
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(b);
            }
            Self::Null => {}
        }
    }
}

/// The textual form emitted as a record value.
impl fmt::Display for Writable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(v) | Self::VLong(v) => write!(f, "{v}"),
            Self::Int(v) | Self::VInt(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bytes(b) => {
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Null => f.write_str("(null)"),
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::format(format!("expected at least {N} bytes, found {}", bytes.len())))
}

fn decode_vint_size(first: i8) -> usize {
    let first = i32::from(first);
    if first >= -112 {
        1
    } else if first < -120 {
        (-119 - first) as usize
    } else {
        (-111 - first) as usize
    }
}

fn is_negative_vint(first: i8) -> bool {
    first < -120 || (-112..0).contains(&first)
}

/// Decode a zero-compressed vlong; returns the value and bytes consumed.
///
/// # Errors
/// Returns [`Error::Format`] if `buf` ends mid-value.
pub fn read_vlong(buf: &[u8]) -> Result<(i64, usize)> {
    let first = *buf.first().ok_or_else(|| Error::format("truncated vint"))? as i8;
    let len = decode_vint_size(first);
    if len == 1 {
        return Ok((i64::from(first), 1));
    }
    let rest = buf
        .get(1..len)
        .ok_or_else(|| Error::format("truncated vint"))?;
    let mut i: i64 = 0;
    for b in rest {
        i = (i << 8) | i64::from(*b);
    }
    Ok((if is_negative_vint(first) { !i } else { i }, len))
}

/// Encode `value` as a zero-compressed vlong.
pub fn write_vlong(out: &mut Vec<u8>, value: i64) {
    if (-112..=127).contains(&value) {
        out.push(value as u8);
        return;
    }
    let mut i = value;
    let mut len: i32 = -112;
    if i < 0 {
        i = !i;
        len = -120;
    }
    let mut tmp = i;
    while tmp != 0 {
        tmp >>= 8;
        len -= 1;
    }
    out.push(len as i8 as u8);
    let n = if len < -120 { -(len + 120) } else { -(len + 112) };
    for idx in (1..=n).rev() {
        let shift = (idx - 1) * 8;
        out.push(((i >> shift) & 0xff) as u8);
    }
}

/// Decode vint-prefixed UTF-8 text (invalid sequences are replaced).
///
/// # Errors
/// Returns [`Error::Format`] if the prefix or payload is truncated.
pub fn read_text(buf: &[u8]) -> Result<(String, usize)> {
    let (len, n) = read_vlong(buf)?;
    let len = usize::try_from(len).map_err(|_| Error::format("negative text length"))?;
    let data = buf
        .get(n..n + len)
        .ok_or_else(|| Error::format("truncated text"))?;
    Ok((String::from_utf8_lossy(data).into_owned(), n + len))
}

pub fn write_text(out: &mut Vec<u8>, s: &str) {
    write_vlong(out, s.len() as i64);
    out.extend_from_slice(s.as_bytes());
}
