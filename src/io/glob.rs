//! Glob expansion for input paths.
//!
//! Input paths may be patterns such as `logs/2024-*/part-*`. Expansion returns
//! files **and** directories (directories are listed later by split discovery),
//! always in sorted order so that split numbering is reproducible.
//!
//! # Examples
//!
//! ```no_run
//! use ironsplit::io::glob::expand_glob;
//!
//! // Every part file under every dated directory
//! let parts = expand_glob("/data/events/day=*/part-*")?;
//! # Ok::<(), ironsplit::Error>(())
//! ```

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern, glob_with};
use std::io;
use std::path::PathBuf;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Whether `s` contains glob metacharacters.
#[must_use]
pub fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn invalid_pattern(pattern: &str, e: impl std::fmt::Display) -> Error {
    Error::io(
        format!("invalid glob pattern: {pattern}"),
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
    )
}

/// Expand a local glob pattern into a sorted vector of matching paths.
///
/// Supports `*`, `?`, `**`, `[abc]` and `[!abc]`. A `*` never crosses a `/` and
/// never matches a leading dot. No match is an empty vector, not an error.
///
/// # Errors
/// Returns [`Error::Io`] if the pattern is invalid or a directory entry cannot
/// be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob_with(pattern, MATCH_OPTIONS).map_err(|e| invalid_pattern(pattern, e))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            Error::io(
                format!("error reading glob entry for pattern: {pattern}"),
                e.into_error(),
            )
        })?;
        result.push(path);
    }

    // Sort for deterministic order
    result.sort();

    Ok(result)
}

/// Match a single candidate path against a pattern with the same rules as
/// [`expand_glob`]. Used by filesystems that list rather than walk.
///
/// # Errors
/// Returns [`Error::Io`] if the pattern is invalid.
pub fn matches_glob(pattern: &str, candidate: &str) -> Result<bool> {
    let p = Pattern::new(pattern).map_err(|e| invalid_pattern(pattern, e))?;
    Ok(p.matches_with(candidate, MATCH_OPTIONS))
}
