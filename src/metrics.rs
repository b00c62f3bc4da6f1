//! Metrics collection and reporting for reader runs.
//!
//! A [`MetricsCollector`] is a thread-safe bag of named [`Metric`]s. Every
//! channel of a run records into the same collector through [`ReaderMetrics`],
//! so counters are totals across channels. Collected metrics can be printed
//! or saved as JSON once the run is over.
//!
//! # Example
//!
//! ```no_run
//! use ironsplit::metrics::{Metric, MetricsCollector};
//! use serde_json::Value;
//!
//! struct Region(&'static str);
//!
//! impl Metric for Region {
//!     fn name(&self) -> &str {
//!         "region"
//!     }
//!
//!     fn value(&self) -> Value {
//!         serde_json::json!(self.0)
//!     }
//!
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//! }
//!
//! let metrics = MetricsCollector::new();
//! metrics.register(Box::new(Region("eu-west")));
//! metrics.increment_counter("records_emitted", 3);
//! metrics.save_to_file("metrics.json")?;
//! # Ok::<(), ironsplit::Error>(())
//! ```

use crate::error::{Error, IoContext, Result};
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A named value reported by a [`MetricsCollector`].
pub trait Metric: Send + Sync + Any {
    /// The name of this metric (e.g., `records_emitted`).
    fn name(&self) -> &str;

    /// The current value as JSON.
    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Cast to Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Thread-safe container of metrics shared by all channels of a run.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

struct MetricsCollectorInner {
    metrics: HashMap<String, Box<dyn Metric>>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsCollectorInner {
                metrics: HashMap::new(),
                start_time: None,
                end_time: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metric, replacing any metric with the same name.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock()
            .metrics
            .insert(metric.name().to_string(), metric);
    }

    /// Record the start of a run. Only the first call counts.
    pub fn record_start(&self) {
        self.lock().start_time.get_or_insert_with(Instant::now);
    }

    /// Record the end of a run.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to the counter `name`, creating it at zero if needed.
    ///
    /// A non-counter metric registered under `name` is left untouched.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.lock();
        let metric = inner
            .metrics
            .entry(name.to_string())
            .or_insert_with(|| Box::new(CounterMetric::new(name)));
        if let Some(counter) = metric.as_any().downcast_ref::<CounterMetric>() {
            counter.add(value);
        }
    }

    /// Replace the counter `name` with one holding `value`.
    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, value)),
        );
    }

    /// Current value of the counter `name`, or 0.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.lock()
            .metrics
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<CounterMetric>())
            .map_or(0, CounterMetric::get)
    }

    /// All metrics as a JSON object, plus `execution_time_ms` when known.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut metrics_json = serde_json::Map::new();

        for (name, metric) in &inner.metrics {
            let mut metric_obj = serde_json::Map::new();
            metric_obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                metric_obj.insert("description".to_string(), json!(desc));
            }
            metrics_json.insert(name.clone(), Value::Object(metric_obj));
        }

        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed_ms = end.duration_since(start).as_millis();
            metrics_json.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": elapsed_ms,
                    "description": "Wall-clock time from start to final marker in milliseconds",
                }),
            );
        }
        drop(inner);
        Value::Object(metrics_json)
    }

    /// Print all metrics to stderr, sorted by name. Stdout carries tuples.
    pub fn print(&self) {
        let inner = self.lock();
        eprintln!("\n=========== Reader Metrics ===========");
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed = end.duration_since(start);
            eprintln!(
                "Execution Time: {:.3}s ({} ms)",
                elapsed.as_secs_f64(),
                elapsed.as_millis()
            );
            eprintln!("--------------------------------------");
        }

        let mut sorted_metrics: Vec<_> = inner.metrics.iter().collect();
        sorted_metrics.sort_by_key(|(name, _)| *name);
        for (name, metric) in sorted_metrics {
            match metric.description() {
                Some(desc) => eprintln!("{name}: {} ({desc})", metric.value()),
                None => eprintln!("{name}: {}", metric.value()),
            }
        }
        drop(inner);
        eprintln!("======================================\n");
    }

    /// Save all metrics to a pretty-printed JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let formatted = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| Error::io(format!("serialize metrics for {path}"), io::Error::other(e)))?;
        std::fs::write(path, formatted).io_context(|| format!("write metrics to {path}"))
    }

    /// Name → value snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Metrics ==========

/// A monotonically increasing counter.
pub struct CounterMetric {
    name: String,
    count: AtomicU64,
    description: Option<String>,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count: AtomicU64::new(count),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.get())
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A gauge holding a single numeric value.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ========== Reader Counters ==========

pub const SPLITS_TOTAL: &str = "splits_total";
pub const SPLITS_ASSIGNED: &str = "splits_assigned";
pub const SPLITS_READ: &str = "splits_read";
pub const RECORDS_EMITTED: &str = "records_emitted";
pub const WINDOW_MARKERS: &str = "window_markers";
pub const BYTES_CONSUMED: &str = "bytes_consumed";

/// Reader-specific counters recorded into a [`MetricsCollector`].
///
/// A `ReaderMetrics` without a collector records nothing.
#[derive(Clone, Default)]
pub struct ReaderMetrics {
    collector: Option<MetricsCollector>,
}

impl ReaderMetrics {
    #[must_use]
    pub fn new(collector: MetricsCollector) -> Self {
        for (name, desc) in [
            (SPLITS_ASSIGNED, "Splits owned by the channels of this run"),
            (SPLITS_READ, "Splits fully consumed"),
            (RECORDS_EMITTED, "Tuples submitted downstream"),
            (WINDOW_MARKERS, "Window markers emitted"),
            (BYTES_CONSUMED, "Input bytes consumed by record readers"),
        ] {
            if !collector.snapshot().contains_key(name) {
                collector.register(Box::new(CounterMetric::new(name).with_description(desc)));
            }
        }
        Self {
            collector: Some(collector),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn collector(&self) -> Option<&MetricsCollector> {
        self.collector.as_ref()
    }

    fn add(&self, name: &str, value: u64) {
        if let Some(c) = &self.collector {
            c.increment_counter(name, value);
        }
    }

    /// Every channel sees the same global split list; the total is set, not added.
    pub fn splits_total(&self, n: usize) {
        if let Some(c) = &self.collector {
            c.set_counter(SPLITS_TOTAL, n as u64);
        }
    }

    pub fn splits_assigned(&self, n: usize) {
        self.add(SPLITS_ASSIGNED, n as u64);
    }

    pub fn split_read(&self, bytes: u64) {
        self.add(SPLITS_READ, 1);
        self.add(BYTES_CONSUMED, bytes);
        self.add(WINDOW_MARKERS, 1);
    }

    pub fn record_emitted(&self) {
        self.add(RECORDS_EMITTED, 1);
    }

    pub fn start(&self) {
        if let Some(c) = &self.collector {
            c.record_start();
        }
    }

    pub fn end(&self) {
        if let Some(c) = &self.collector {
            c.record_end();
        }
    }
}
