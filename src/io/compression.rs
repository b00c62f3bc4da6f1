//! Pluggable compression codecs for text input.
//!
//! Compressed text files are read transparently and are never split: a
//! compressed stream cannot be entered at an arbitrary byte offset, so the whole
//! file becomes a single split read from the start.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags:
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! ## Detection
//! Split discovery only looks at the file extension ([`codec_for_path`]) because
//! it must decide splittability without opening the file. Readers use
//! [`auto_detect_reader`], which falls back to magic bytes.
//!
//! ### Custom Codec Implementation
//! ```
//! use ironsplit::io::compression::{register_codec, CompressionCodec};
//! use std::io::{Read, Write, Result};
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".ident"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, r: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> { Ok(r) }
//!     fn wrap_writer_dyn(&self, w: Box<dyn Write>) -> Result<Box<dyn Write>> { Ok(w) }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use crate::error::{IoContext, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom compression codec globally.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A compression algorithm that can wrap byte streams.
///
/// Implementations are stored in a global registry and must be `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase extensions including the dot (e.g., `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Optional leading signature used when the extension is not recognized.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read + Send>)
    -> std::io::Result<Box<dyn Read + Send>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

/// Codec registered for the extension of `path`, if any.
#[must_use]
pub fn codec_for_path(path: &str) -> Option<Arc<dyn CompressionCodec>> {
    let lower = path.to_lowercase();
    get_registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| lower.ends_with(ext)))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    get_registry().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// Wrap `reader` with decompression when the extension or magic bytes ask for it.
///
/// The returned reader is positioned at the first decompressed byte.
///
/// # Errors
/// Returns an error if the codec cannot initialise its decoder.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: &str,
) -> Result<Box<dyn Read + Send>> {
    if let Some(codec) = codec_for_path(path_hint) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .io_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .io_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap `writer` with compression chosen by the extension of `path`.
///
/// # Errors
/// Returns an error if the codec cannot initialise its encoder.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = codec_for_path(&path.as_ref().to_string_lossy()) {
        return codec
            .wrap_writer_dyn(Box::new(writer))
            .io_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader_dyn(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, 6)))
    }
}
