//! Running several channels of one reader inside a single process.
//!
//! A [`ParallelRegion`] of width M creates M independent
//! [`InputFormatReader`]s, channel `c` of M each, sharing nothing but the
//! metrics collector. All of them are initialized before any is started, so a
//! configuration problem never leaves a half-started region behind.

use crate::error::{Error, Result};
use crate::metrics::GaugeMetric;
use crate::operator::{InputFormatReader, OperatorContext, ReaderParams, ReaderState};
use crate::sink::OutputPort;
use tracing::{debug, error};

/// Width and shared context of a group of channels.
#[derive(Clone)]
pub struct ParallelRegion {
    width: usize,
    context: OperatorContext,
}

impl ParallelRegion {
    /// # Errors
    /// [`Error::Config`] if `width` is 0.
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::config("parallel region width must be at least 1"));
        }
        Ok(Self {
            width,
            context: OperatorContext::new("InputFormatReader"),
        })
    }

    /// One channel per available CPU.
    #[must_use]
    pub fn with_default_width() -> Self {
        Self {
            width: num_cpus::get().max(1),
            context: OperatorContext::new("InputFormatReader"),
        }
    }

    /// Context every channel starts from; the channel position is filled in
    /// per instance.
    #[must_use]
    pub fn context(mut self, context: OperatorContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Initialize every channel, then start them all.
    ///
    /// `make_port(c)` supplies channel `c`'s output port.
    ///
    /// # Errors
    /// The first initialization or start error; no channel runs in that case.
    pub fn launch<F>(&self, params: &ReaderParams, mut make_port: F) -> Result<RunningRegion>
    where
        F: FnMut(usize) -> OutputPort,
    {
        if let Some(collector) = self.context.metrics_collector() {
            collector.register(Box::new(
                GaugeMetric::new("channels", self.width as f64)
                    .with_description("Channels in the parallel region"),
            ));
        }

        let mut readers = Vec::with_capacity(self.width);
        for channel in 0..self.width {
            let ctx = self.context.clone().with_channel(channel, self.width);
            readers.push(InputFormatReader::initialize(
                params.clone(),
                &ctx,
                vec![make_port(channel)],
            )?);
        }
        debug!(width = self.width, "parallel region initialized");

        let mut region = RunningRegion { readers };
        region.start_all()?;
        Ok(region)
    }

    /// [`launch`](Self::launch) and wait for every channel.
    ///
    /// # Errors
    /// As for [`launch`](Self::launch) and [`RunningRegion::join`].
    pub fn run<F>(&self, params: &ReaderParams, make_port: F) -> Result<()>
    where
        F: FnMut(usize) -> OutputPort,
    {
        self.launch(params, make_port)?.join()
    }
}

/// Channels of a region that have been started.
pub struct RunningRegion {
    readers: Vec<InputFormatReader>,
}

impl RunningRegion {
    #[must_use]
    pub fn readers(&self) -> &[InputFormatReader] {
        &self.readers
    }

    #[must_use]
    pub fn states(&self) -> Vec<ReaderState> {
        self.readers.iter().map(InputFormatReader::state).collect()
    }

    /// Wait for every channel. All channels are joined even if one fails.
    ///
    /// # Errors
    /// The error of the lowest-numbered failed channel.
    pub fn join(mut self) -> Result<()> {
        self.finish(InputFormatReader::join)
    }

    /// Interrupt every channel and wait for them.
    ///
    /// # Errors
    /// The error of the lowest-numbered channel that failed before stopping.
    pub fn shutdown(&mut self) -> Result<()> {
        self.finish(InputFormatReader::shutdown)
    }

    /// Start every channel. If one fails to start, the others are stopped
    /// and the start error is returned.
    fn start_all(&mut self) -> Result<()> {
        for i in 0..self.readers.len() {
            if let Err(e) = self.readers[i].all_ports_ready() {
                // Already started channels would otherwise keep producing.
                if let Err(stop) = self.shutdown() {
                    error!(error = %stop, cause = %e, "failed to stop channels after a start failure");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn finish(&mut self, step: fn(&mut InputFormatReader) -> Result<()>) -> Result<()> {
        let mut first = None;
        for reader in &mut self.readers {
            if let Err(e) = step(reader) {
                error!(operator = reader.name(), channel = reader.assignment().channel(), error = %e, "channel failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
