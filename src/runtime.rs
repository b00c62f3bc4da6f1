//! Background execution: cancellation, the production thread, and in-process
//! parallel regions.
//!
//! Each [`InputFormatReader`](crate::InputFormatReader) owns exactly one
//! production thread. The thread is created during initialization and only
//! started once every output port is connected ([`ProcessThread::start`]).
//! Shutdown flips a [`CancellationToken`]; the emission loop checks it between
//! records and splits, and [`CancellableRead`] makes blocked reads fail fast so a
//! thread stuck in I/O notices too.

use crate::error::{Error, Result};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{error, trace};

/// Shared, clonable shutdown flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once the token has been triggered.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] after [`cancel`](Self::cancel).
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
struct CancelledRead;

impl fmt::Display for CancelledRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("read cancelled by shutdown")
    }
}

impl std::error::Error for CancelledRead {}

/// Whether an `io::Error` was produced by a [`CancellableRead`] after shutdown.
#[must_use]
pub fn is_cancelled_io(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<CancelledRead>())
}

/// `Read` adapter that refuses to read once its token is cancelled.
///
/// The error uses `ErrorKind::Other`: `Interrupted` would be silently retried by
/// `BufRead` helpers.
pub struct CancellableRead<R> {
    inner: R,
    token: CancellationToken,
}

impl<R: Read> CancellableRead<R> {
    pub fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other(CancelledRead));
        }
        self.inner.read(buf)
    }
}

impl<R: io::Seek> io::Seek for CancellableRead<R> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

type Job = Box<dyn FnOnce(CancellationToken) -> Result<()> + Send + 'static>;

/// A production thread that has been prepared but not necessarily started.
pub struct ProcessThread {
    name: String,
    token: CancellationToken,
    job: Option<Job>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl ProcessThread {
    /// Prepare a thread that will run `job` with this thread's token.
    pub fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
            job: Some(Box::new(job)),
            handle: None,
        }
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the OS thread. Calling `start` twice is a configuration error.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if already started, [`Error::Io`] if the OS
    /// refuses to spawn.
    pub fn start(&mut self) -> Result<()> {
        let Some(job) = self.job.take() else {
            return Err(Error::config(format!("thread {} already started", self.name)));
        };
        let token = self.token.clone();
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let res = job(token);
                match &res {
                    Ok(()) => trace!(thread = %name, "production finished"),
                    Err(e) if e.is_cancelled() => trace!(thread = %name, "production cancelled"),
                    Err(e) => error!(thread = %name, error = %e, "operator error"),
                }
                res
            })
            .map_err(|e| Error::io(format!("spawn thread {}", self.name), e))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Request cancellation. Does not wait for the thread.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    /// Wait for the thread and return its outcome. Cancellation counts as success.
    ///
    /// # Errors
    /// Returns the production error, or [`Error::Config`] if the thread was never
    /// started or panicked.
    pub fn join(mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Err(Error::config(format!("thread {} was never started", self.name)));
        };
        match handle.join() {
            Ok(Ok(())) | Ok(Err(Error::Cancelled)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::config(format!("thread {} panicked", self.name))),
        }
    }
}

impl Drop for ProcessThread {
    fn drop(&mut self) {
        // An abandoned running thread must not keep reading.
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cancellable_read_fails_after_cancel() {
        let token = CancellationToken::new();
        let mut r = CancellableRead::new(Cursor::new(vec![1u8, 2, 3]), token.clone());
        let mut buf = [0u8; 1];
        assert_eq!(r.read(&mut buf).unwrap(), 1);
        token.cancel();
        let err = r.read(&mut buf).unwrap_err();
        assert!(is_cancelled_io(&err));
    }

    #[test]
    fn thread_cannot_start_twice() {
        let mut t = ProcessThread::new("t", |_| Ok(()));
        t.start().unwrap();
        assert!(t.start().is_err());
        t.join().unwrap();
    }

    #[test]
    fn cancelled_job_joins_cleanly() {
        let mut t = ProcessThread::new("spin", |token: CancellationToken| {
            loop {
                token.check()?;
                std::thread::yield_now();
            }
        });
        t.start().unwrap();
        t.interrupt();
        t.join().unwrap();
    }
}
