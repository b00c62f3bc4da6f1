//! The input-format reader operator.
//!
//! One [`InputFormatReader`] is one channel. Initialization does all the work
//! that can fail up front: it validates the output port, builds the
//! configuration, lists the input, computes the global split list, and
//! prepares (but does not start) the production thread. Nothing is read until
//! [`InputFormatReader::all_ports_ready`].
//!
//! The production thread walks this channel's splits in increasing index
//! order. Each split gets a fresh record reader; every record becomes a tuple
//! with `key` and/or `value` filled in, and a window marker follows the last
//! record of the split. After the last split the channel emits one final
//! marker. A channel that owns no splits emits only the final marker.
//!
//! ```text
//! Idle -> Initializing -> Running -> Draining -> Terminated
//! ```

use crate::assign::ChannelAssignment;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::format::{FileSplit, FileType, InputFormat, TaskAttemptId, TaskContext};
use crate::fs::{FileSystem, FileSystems};
use crate::metrics::{MetricsCollector, ReaderMetrics};
use crate::runtime::{CancellationToken, ProcessThread};
use crate::schema::FieldSlots;
use crate::sink::OutputPort;
use crate::tuple::{Punctuation, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

/// User-facing operator parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaderParams {
    /// Input files, directories, or glob patterns.
    pub files: Vec<String>,
    /// Configuration resource files, absolute or relative to the application
    /// directory.
    pub config_resources: Vec<String>,
    pub file_type: FileType,
}

impl ReaderParams {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    #[must_use]
    pub fn config_resource(mut self, resource: impl Into<String>) -> Self {
        self.config_resources.push(resource.into());
        self
    }
}

/// What the hosting runtime tells an operator instance about its deployment.
#[derive(Clone, Default)]
pub struct OperatorContext {
    name: String,
    channel: Option<(usize, usize)>,
    application_dir: Option<PathBuf>,
    filesystems: Vec<Arc<dyn FileSystem>>,
    overrides: Vec<(String, String)>,
    metrics: Option<MetricsCollector>,
}

impl OperatorContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Place this instance in a parallel region.
    #[must_use]
    pub fn with_channel(mut self, channel: usize, max_channels: usize) -> Self {
        self.channel = Some((channel, max_channels));
        self
    }

    /// Directory relative configuration resources are resolved against.
    #[must_use]
    pub fn application_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.application_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Serve an additional URI scheme.
    #[must_use]
    pub fn register_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.filesystems.push(fs);
        self
    }

    /// Set a configuration property after all resources are applied.
    #[must_use]
    pub fn set_config(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn metrics(mut self, collector: MetricsCollector) -> Self {
        self.metrics = Some(collector);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn channel(&self) -> Option<(usize, usize)> {
        self.channel
    }

    #[must_use]
    pub fn metrics_collector(&self) -> Option<&MetricsCollector> {
        self.metrics.as_ref()
    }
}

/// Lifecycle state of a reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReaderState {
    #[default]
    Idle,
    Initializing,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Default)]
struct StateCell(Arc<Mutex<ReaderState>>);

impl StateCell {
    fn get(&self) -> ReaderState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, name: &str, next: ReaderState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(operator = name, from = %*state, to = %next, "state change");
        *state = next;
    }
}

/// One channel of the input-format reader.
pub struct InputFormatReader {
    name: String,
    assignment: ChannelAssignment,
    conf: Arc<Configuration>,
    splits: Arc<[FileSplit]>,
    state: StateCell,
    thread: Option<ProcessThread>,
}

impl InputFormatReader {
    /// Validate the output ports: exactly one, with a usable `key`/`value`.
    ///
    /// # Errors
    /// [`Error::Config`] for a port count other than one or a schema with
    /// neither attribute; [`Error::TypeContract`] for wrongly typed attributes.
    pub fn check_ports(outputs: &[OutputPort]) -> Result<FieldSlots> {
        let [port] = outputs else {
            return Err(Error::config(format!(
                "exactly one output port is supported, found {}",
                outputs.len()
            )));
        };
        FieldSlots::resolve(port.schema())
    }

    /// Build a reader ready to start.
    ///
    /// # Errors
    /// Any [`Error::Config`], [`Error::TypeContract`], or [`Error::Io`] found
    /// while validating, configuring, or computing splits. No thread exists
    /// when this fails.
    pub fn initialize(
        params: ReaderParams,
        ctx: &OperatorContext,
        mut outputs: Vec<OutputPort>,
    ) -> Result<Self> {
        let name = if ctx.name.is_empty() {
            "InputFormatReader".to_string()
        } else {
            ctx.name.clone()
        };
        let state = StateCell::default();
        state.set(&name, ReaderState::Initializing);

        let slots = Self::check_ports(&outputs)?;
        let assignment = ChannelAssignment::from_context(ctx.channel)?;

        let mut builder = Configuration::builder().add_resources(params.config_resources.iter().cloned());
        if let Some(dir) = &ctx.application_dir {
            builder = builder.application_dir(dir);
        }
        for (k, v) in &ctx.overrides {
            builder = builder.set(k.clone(), v.clone());
        }
        let conf = Arc::new(builder.build()?);

        let default_fs = conf.default_fs();
        debug!(operator = %name, %default_fs, resources = ?conf.resources(), "resolved configuration");
        if !params.config_resources.is_empty() && !default_fs.starts_with("hdfs") {
            warn!(
                operator = %name,
                %default_fs,
                "Default file system is not HDFS; the configuration resources may be wrong"
            );
        }

        let mut filesystems = FileSystems::new(&conf)?;
        for fs in &ctx.filesystems {
            filesystems.register(Arc::clone(fs));
        }
        let filesystems = Arc::new(filesystems);

        let format = InputFormat::new(params.file_type, &conf)?;
        let splits: Arc<[FileSplit]> = format
            .compute_splits(&params.files, &conf, &filesystems)?
            .into();
        info!(operator = %name, "There are {} splits", splits.len());

        let metrics = ctx
            .metrics
            .clone()
            .map_or_else(ReaderMetrics::disabled, ReaderMetrics::new);
        metrics.splits_total(splits.len());
        metrics.splits_assigned(assignment.assigned_indices(splits.len()).count());

        let port = outputs.remove(0);
        let emission = EmissionLoop {
            name: name.clone(),
            format,
            splits: Arc::clone(&splits),
            assignment,
            slots,
            conf: Arc::clone(&conf),
            filesystems,
            port,
            state: state.clone(),
            metrics,
        };
        let thread_name = format!("{name}-c{}", assignment.channel());
        let thread = ProcessThread::new(thread_name, move |token| emission.run(&token));

        Ok(Self {
            name,
            assignment,
            conf,
            splits,
            state,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The global split list, identical for every channel.
    #[must_use]
    pub fn splits(&self) -> &[FileSplit] {
        &self.splits
    }

    #[must_use]
    pub fn assignment(&self) -> ChannelAssignment {
        self.assignment
    }

    /// Splits this channel will read, in reading order.
    #[must_use]
    pub fn assigned_splits(&self) -> Vec<&FileSplit> {
        self.assignment
            .assigned_indices(self.splits.len())
            .map(|i| &self.splits[i])
            .collect()
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.conf
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state.get()
    }

    /// Start production; call once every downstream consumer is connected.
    ///
    /// # Errors
    /// [`Error::Config`] if already started or already joined.
    pub fn all_ports_ready(&mut self) -> Result<()> {
        let thread = self
            .thread
            .as_mut()
            .ok_or_else(|| Error::config(format!("{} has already finished", self.name)))?;
        thread.start()
    }

    /// Token that stops this reader when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.thread.as_ref().map(|t| t.token().clone())
    }

    /// Wait for production to finish.
    ///
    /// # Errors
    /// The error that ended production, if any. Cancellation is not an error.
    pub fn join(&mut self) -> Result<()> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| Error::config(format!("{} was already joined", self.name)))?;
        let res = thread.join();
        if self.state.get() != ReaderState::Terminated {
            self.state.set(&self.name, ReaderState::Terminated);
        }
        res
    }

    /// Interrupt production and wait for the thread to exit.
    ///
    /// A reader that was never started just terminates.
    ///
    /// # Errors
    /// A production error that happened before the interrupt took effect.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.as_ref() else {
            return Ok(());
        };
        info!(operator = %self.name, "shutdown requested");
        thread.interrupt();
        if thread.is_started() {
            self.join()
        } else {
            self.thread = None;
            self.state.set(&self.name, ReaderState::Terminated);
            Ok(())
        }
    }
}

impl fmt::Debug for InputFormatReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFormatReader")
            .field("name", &self.name)
            .field("assignment", &self.assignment)
            .field("splits", &self.splits.len())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Everything the production thread owns.
struct EmissionLoop {
    name: String,
    format: InputFormat,
    splits: Arc<[FileSplit]>,
    assignment: ChannelAssignment,
    slots: FieldSlots,
    conf: Arc<Configuration>,
    filesystems: Arc<FileSystems>,
    port: OutputPort,
    state: StateCell,
    metrics: ReaderMetrics,
}

impl EmissionLoop {
    fn run(mut self, token: &CancellationToken) -> Result<()> {
        let res = self.produce(token);
        self.state.set(&self.name, ReaderState::Terminated);
        res
    }

    fn produce(&mut self, token: &CancellationToken) -> Result<()> {
        self.state.set(&self.name, ReaderState::Running);
        self.metrics.start();
        let splits = Arc::clone(&self.splits);

        for index in self.assignment.assigned_indices(splits.len()) {
            token.check()?;
            let split = &splits[index];
            info!(
                operator = %self.name,
                channel = self.assignment.channel(),
                "Handling split {index}: {split}"
            );
            let task = TaskContext {
                conf: Arc::clone(&self.conf),
                filesystems: Arc::clone(&self.filesystems),
                token: token.clone(),
                attempt: TaskAttemptId {
                    channel: self.assignment.channel(),
                    max_channels: self.assignment.max_channels(),
                    split: index,
                },
            };
            let bytes = self.emit_split(split, &task)?;
            self.port.punctuate(Punctuation::WindowMarker)?;
            self.metrics.split_read(bytes);
        }

        self.state.set(&self.name, ReaderState::Draining);
        self.port.punctuate(Punctuation::FinalMarker)?;
        self.metrics.end();
        Ok(())
    }

    /// Emit every record of one split; the reader is dropped on return.
    fn emit_split(&mut self, split: &FileSplit, task: &TaskContext) -> Result<u64> {
        let mut reader = self.format.create_record_reader(split, task)?;
        while let Some(record) = reader.next_record()? {
            task.token.check()?;
            let mut tuple = self.port.new_tuple();
            if let Some(slot) = self.slots.key {
                tuple.set(slot, Value::Int64(record.key))?;
            }
            if let Some(slot) = self.slots.value {
                tuple.set(slot, Value::String(record.value))?;
            }
            self.port.submit(tuple)?;
            self.metrics.record_emitted();
        }
        Ok(reader.bytes_consumed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::schema::StreamSchema;
    use crate::sink::CollectingSink;
    use crate::tuple::StreamItem;

    fn memory_ctx(files: &[(&str, &str)]) -> OperatorContext {
        let fs = MemoryFileSystem::new(16);
        for (path, data) in files {
            fs.put(path, data.as_bytes().to_vec());
        }
        OperatorContext::new("reader").register_filesystem(Arc::new(fs))
    }

    #[test]
    fn two_ports_are_rejected() {
        let ports = vec![
            OutputPort::new(StreamSchema::key_value(), CollectingSink::new()),
            OutputPort::new(StreamSchema::key_value(), CollectingSink::new()),
        ];
        let err = InputFormatReader::check_ports(&ports).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn state_walks_the_lifecycle() {
        let ctx = memory_ctx(&[("/in/a.txt", "one\ntwo\n")]);
        let sink = CollectingSink::new();
        let mut reader = InputFormatReader::initialize(
            ReaderParams::new(["mem:///in/a.txt"]),
            &ctx,
            vec![OutputPort::new(StreamSchema::key_value(), sink.clone())],
        )
        .unwrap();
        assert_eq!(reader.state(), ReaderState::Initializing);
        reader.all_ports_ready().unwrap();
        reader.join().unwrap();
        assert_eq!(reader.state(), ReaderState::Terminated);
        assert!(sink.items().last().unwrap().is_punctuation(Punctuation::FinalMarker));
    }

    #[test]
    fn shutdown_before_start_terminates() {
        let ctx = memory_ctx(&[("/in/a.txt", "x\n")]);
        let sink = CollectingSink::new();
        let mut reader = InputFormatReader::initialize(
            ReaderParams::new(["mem:///in/a.txt"]),
            &ctx,
            vec![OutputPort::new(StreamSchema::key_value(), sink.clone())],
        )
        .unwrap();
        reader.shutdown().unwrap();
        assert_eq!(reader.state(), ReaderState::Terminated);
        assert!(sink.items().is_empty());
        assert!(reader.all_ports_ready().is_err());
    }

    #[test]
    fn extra_attributes_keep_defaults() {
        let ctx = memory_ctx(&[("/in/a.txt", "hello\n")]);
        let sink = CollectingSink::new();
        let schema = StreamSchema::key_value().with("tag", crate::schema::AttributeType::Int32);
        let mut reader = InputFormatReader::initialize(
            ReaderParams::new(["mem:///in/a.txt"]),
            &ctx,
            vec![OutputPort::new(schema, sink.clone())],
        )
        .unwrap();
        reader.all_ports_ready().unwrap();
        reader.join().unwrap();
        let StreamItem::Tuple(t) = &sink.items()[0] else {
            panic!("expected a tuple first");
        };
        assert_eq!(t.get_by_name("tag"), Some(&Value::Int32(0)));
        assert_eq!(t.get_str("value"), Some("hello"));
    }
}
