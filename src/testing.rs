//! Testing utilities for reader runs.
//!
//! This module bundles what the crate's own tests use so downstream users can
//! test their configurations the same way:
//!
//! - **Fixtures**: write text and sequence input files, standard schemas
//! - **Assertions**: check stream shape (records, window markers, final marker)
//!   and extract record payloads
//! - **Mock I/O**: temporary directories and in-memory filesystems
//! - [`run_channels`]: run a full parallel region and collect every channel
//!
//! # Quick Start
//!
//! ```no_run
//! use ironsplit::testing::*;
//! use ironsplit::{OperatorContext, ReaderParams};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = TempDirPath::new()?;
//! let lines = numbered_lines(100);
//! write_text_file(dir.path(), "a.txt", &lines)?;
//!
//! let channels = run_channels(
//!     &ReaderParams::new([dir.input("a.txt")]),
//!     &OperatorContext::new("test"),
//!     &key_value_schema(),
//!     1,
//! )?;
//! assert_eq!(key_values_of(&channels[0]), expected_text_records(&lines));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;

use crate::error::Result;
use crate::operator::{OperatorContext, ReaderParams};
use crate::region::ParallelRegion;
use crate::schema::StreamSchema;
use crate::sink::{CollectingSink, OutputPort};
use crate::tuple::StreamItem;

/// Run `width` channels to completion and return each channel's stream.
///
/// # Errors
/// The first initialization or production error.
pub fn run_channels(
    params: &ReaderParams,
    context: &OperatorContext,
    schema: &StreamSchema,
    width: usize,
) -> Result<Vec<Vec<StreamItem>>> {
    let sinks: Vec<CollectingSink> = (0..width).map(|_| CollectingSink::new()).collect();
    ParallelRegion::new(width)?
        .context(context.clone())
        .run(params, |c| OutputPort::new(schema.clone(), sinks[c].clone()))?;
    Ok(sinks.iter().map(CollectingSink::items).collect())
}

/// Tuples of several channels concatenated by global split index.
///
/// Channel `c` reads splits `c, c + M, c + 2M, ...` and closes each with a
/// window marker, so interleaving windows round-robin restores the
/// single-channel order.
#[must_use]
pub fn merge_by_split(channels: &[Vec<StreamItem>]) -> Vec<StreamItem> {
    let windows: Vec<Vec<Vec<StreamItem>>> = channels
        .iter()
        .map(|items| {
            let mut out = Vec::new();
            let mut current = Vec::new();
            for item in items {
                match item {
                    StreamItem::Tuple(_) => current.push(item.clone()),
                    StreamItem::Punctuation(crate::Punctuation::WindowMarker) => {
                        out.push(std::mem::take(&mut current));
                    }
                    StreamItem::Punctuation(_) => {}
                }
            }
            out
        })
        .collect();

    let mut merged = Vec::new();
    let longest = windows.iter().map(Vec::len).max().unwrap_or(0);
    for round in 0..longest {
        for channel in &windows {
            if let Some(w) = channel.get(round) {
                merged.extend(w.iter().cloned());
            }
        }
    }
    merged
}
