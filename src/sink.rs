//! Output ports and the sinks they feed.
//!
//! An [`OutputPort`] pairs the port's schema with a [`TupleSink`]. The reader
//! thread owns the port and pushes tuples and punctuation through it in
//! stream order. Sinks provided here:
//!
//! - [`CollectingSink`] keeps everything in memory (tests, small runs)
//! - [`ChannelSink`] forwards to a bounded `std::sync::mpsc` channel
//! - [`FnSink`] calls a closure per item (the CLI's printers)

use crate::error::{Error, Result};
use crate::schema::StreamSchema;
use crate::tuple::{Punctuation, StreamItem, Tuple};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};

/// Consumer of one output stream.
pub trait TupleSink: Send {
    /// # Errors
    /// [`Error::Sink`] if the consumer is gone.
    fn submit(&mut self, tuple: Tuple) -> Result<()>;

    /// # Errors
    /// [`Error::Sink`] if the consumer is gone.
    fn punctuate(&mut self, punctuation: Punctuation) -> Result<()>;
}

/// A connected output port.
pub struct OutputPort {
    schema: Arc<StreamSchema>,
    sink: Box<dyn TupleSink>,
}

impl OutputPort {
    pub fn new(schema: StreamSchema, sink: impl TupleSink + 'static) -> Self {
        Self {
            schema: Arc::new(schema),
            sink: Box::new(sink),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &StreamSchema {
        &self.schema
    }

    /// A tuple of this port's schema holding default values.
    #[must_use]
    pub fn new_tuple(&self) -> Tuple {
        Tuple::new(Arc::clone(&self.schema))
    }

    /// # Errors
    /// Propagates the sink's error.
    pub fn submit(&mut self, tuple: Tuple) -> Result<()> {
        self.sink.submit(tuple)
    }

    /// # Errors
    /// Propagates the sink's error.
    pub fn punctuate(&mut self, punctuation: Punctuation) -> Result<()> {
        self.sink.punctuate(punctuation)
    }
}

/// Records every item; clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    items: Arc<Mutex<Vec<StreamItem>>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in order.
    #[must_use]
    pub fn items(&self) -> Vec<StreamItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, item: StreamItem) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }
}

impl TupleSink for CollectingSink {
    fn submit(&mut self, tuple: Tuple) -> Result<()> {
        self.push(StreamItem::Tuple(tuple));
        Ok(())
    }

    fn punctuate(&mut self, punctuation: Punctuation) -> Result<()> {
        self.push(StreamItem::Punctuation(punctuation));
        Ok(())
    }
}

/// Forwards items to a bounded channel; blocks while the channel is full.
pub struct ChannelSink {
    tx: SyncSender<StreamItem>,
}

/// A [`ChannelSink`] and the receiving end, holding at most `bound` items.
#[must_use]
pub fn channel_sink(bound: usize) -> (ChannelSink, Receiver<StreamItem>) {
    let (tx, rx) = sync_channel(bound);
    (ChannelSink { tx }, rx)
}

impl ChannelSink {
    fn send(&self, item: StreamItem) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| Error::Sink("receiver disconnected".to_string()))
    }
}

impl TupleSink for ChannelSink {
    fn submit(&mut self, tuple: Tuple) -> Result<()> {
        self.send(StreamItem::Tuple(tuple))
    }

    fn punctuate(&mut self, punctuation: Punctuation) -> Result<()> {
        self.send(StreamItem::Punctuation(punctuation))
    }
}

/// Calls a closure for every item.
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(StreamItem) -> Result<()> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> TupleSink for FnSink<F>
where
    F: FnMut(StreamItem) -> Result<()> + Send,
{
    fn submit(&mut self, tuple: Tuple) -> Result<()> {
        (self.f)(StreamItem::Tuple(tuple))
    }

    fn punctuate(&mut self, punctuation: Punctuation) -> Result<()> {
        (self.f)(StreamItem::Punctuation(punctuation))
    }
}
