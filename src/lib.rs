//! # Ironsplit
//!
//! A **split-partitioned file reader** for Rust. Ironsplit lists a set of input
//! paths, cuts the files into byte-range splits, hands the splits round-robin
//! to parallel channels, and emits every record as a tuple carrying a numeric
//! `key` and/or a string `value`, with punctuation marking the end of each
//! split and the end of each channel's stream.
//!
//! ## Key Features
//!
//! - **Two input formats** - line-oriented text and binary key/value sequence files
//! - **Block-sized splits** - files are split at block boundaries with a 10% slop
//!   for the last split; compressed text is read whole
//! - **Deterministic channel assignment** - split `i` belongs to channel `i % M`
//! - **Stream punctuation** - a window marker after every split, one final
//!   marker per channel
//! - **Pluggable filesystems** - local disk and an in-memory fake built in,
//!   others via the [`FileSystem`] trait
//! - **Site-style XML configuration** - `final` properties and `${var}` expansion
//! - **Transparent decompression** - gzip, zstd, bzip2, and xz (feature flags)
//! - **Prompt cancellation** - shutdown interrupts blocked reads
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironsplit::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let sink = CollectingSink::new();
//! let mut reader = InputFormatReader::initialize(
//!     ReaderParams::new(["/data/a.txt"]).file_type(FileType::Text),
//!     &OperatorContext::new("reader"),
//!     vec![OutputPort::new(StreamSchema::key_value(), sink.clone())],
//! )?;
//! reader.all_ports_ready()?;
//! reader.join()?;
//!
//! for item in sink.items() {
//!     if let Some(t) = item.as_tuple() {
//!         println!("{:?} {:?}", t.get_i64("key"), t.get_str("value"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Splits
//!
//! A [`FileSplit`] is a byte range of one file. The split list is computed once
//! per reader from the input paths and configuration and never changes. Its
//! order (input order, then byte order) is the same for every channel, which is
//! what makes independent channels agree on who reads what.
//!
//! ### Channels
//!
//! Each [`InputFormatReader`] is one channel `c` of `M`. It reads the splits
//! `c, c + M, c + 2M, ...` strictly in order on its own thread. Channels share
//! nothing mutable and never coordinate. A [`ParallelRegion`] runs `M` channels
//! in one process.
//!
//! ### Emitted stream
//!
//! For a channel reading splits `s0 .. sk`:
//!
//! ```text
//! records(s0)* WindowMarker records(s1)* WindowMarker ... records(sk)* WindowMarker FinalMarker
//! ```
//!
//! A channel with no splits emits only the `FinalMarker`.
//!
//! ### Output schema
//!
//! The single output port's schema must contain `key` (`int64`), `value`
//! (`rstring`/`ustring`), or both. Anything else is left at its default value.
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz` -
//!   decompression codecs for text input
//! - `parallel-io` - list input paths on a thread pool when
//!   `mapreduce.input.fileinputformat.list-status.num-threads > 1`
//! - `cli` - the `ironsplit` command-line tool
//!
//! ## Module Overview
//!
//! - [`operator`] - the reader operator, its parameters, context, and lifecycle
//! - [`region`] - running several channels in one process
//! - [`format`] - split computation, text and sequence record readers
//! - [`assign`] - round-robin split assignment
//! - [`fs`] - filesystem trait and implementations
//! - [`config`] - XML-backed configuration
//! - [`schema`], [`tuple`], [`sink`] - output schemas, tuples, and sinks
//! - [`runtime`] - production threads and cancellation
//! - [`metrics`] - run counters
//! - [`testing`] - fixtures and stream assertions

pub mod assign;
pub mod config;
pub mod error;
pub mod format;
pub mod fs;
pub mod io;
pub mod metrics;
pub mod operator;
pub mod region;
pub mod runtime;
pub mod schema;
pub mod sink;
pub mod testing;
pub mod tuple;

// General re-exports
pub use assign::{ChannelAssignment, is_assigned};
pub use config::{Configuration, ConfigurationBuilder};
pub use error::{Error, Result};
pub use format::{FileSplit, FileType, InputFormat, Record, RecordReader};
pub use fs::{FileStatus, FileSystem, FileSystems, FsPath, LocalFileSystem, MemoryFileSystem};
pub use metrics::{MetricsCollector, ReaderMetrics};
pub use operator::{InputFormatReader, OperatorContext, ReaderParams, ReaderState};
pub use region::{ParallelRegion, RunningRegion};
pub use runtime::CancellationToken;
pub use schema::{AttributeType, FieldSlots, StreamSchema};
pub use sink::{ChannelSink, CollectingSink, FnSink, OutputPort, TupleSink, channel_sink};
pub use tuple::{Punctuation, StreamItem, Tuple, Value};
