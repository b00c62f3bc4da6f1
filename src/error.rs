//! Error taxonomy for split discovery, reading, and emission.
//!
//! Initialization problems surface as [`Error::Config`] or [`Error::TypeContract`]
//! before any background thread exists. Everything that goes wrong while a
//! channel is producing ([`Error::Io`], [`Error::Format`], [`Error::Sink`]) ends
//! that channel; nothing is retried or skipped. [`Error::Cancelled`] is the
//! result of a shutdown request and is not treated as a failure by the runtime.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters, missing configuration resources, or an unusable schema.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `key` or `value` attribute exists but has the wrong type.
    #[error("type contract violated: {0}")]
    TypeContract(String),

    /// Filesystem failure while listing, opening, or reading input.
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The bytes on disk do not match the selected file format.
    #[error("format error: {0}")]
    Format(String),

    /// The output consumer is gone.
    #[error("sink error: {0}")]
    Sink(String),

    /// Production was interrupted by a shutdown request.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error is the outcome of cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Attach a context string to `io::Result`s, like `anyhow::Context` does.
pub(crate) trait IoContext<T> {
    fn io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            if crate::runtime::is_cancelled_io(&e) {
                Error::Cancelled
            } else {
                Error::io(f(), e)
            }
        })
    }
}
