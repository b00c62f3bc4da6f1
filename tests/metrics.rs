//! Tests for the metrics module.

use anyhow::Result;
use ironsplit::metrics::{
    BYTES_CONSUMED, CounterMetric, GaugeMetric, Metric, MetricsCollector, RECORDS_EMITTED,
    SPLITS_ASSIGNED, SPLITS_READ, SPLITS_TOTAL, WINDOW_MARKERS,
};
use ironsplit::testing::*;
use ironsplit::{OperatorContext, ReaderParams};
use serde_json::json;

#[test]
fn test_counter_metric() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("test_counter", 5)));

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.get("test_counter").unwrap(), &json!(5));
}

#[test]
fn test_gauge_metric() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(
        GaugeMetric::new("test_gauge", 42.5).with_description("Test gauge"),
    ));

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.get("test_gauge").unwrap(), &json!(42.5));
}

#[test]
fn test_increment_counter() {
    let collector = MetricsCollector::new();
    collector.increment_counter("requests", 1);
    collector.increment_counter("requests", 5);

    assert_eq!(collector.counter("requests"), 6);
}

#[test]
fn test_increment_leaves_gauges_alone() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(GaugeMetric::new("width", 4.0)));
    collector.increment_counter("width", 1);

    assert_eq!(collector.snapshot().get("width").unwrap(), &json!(4.0));
    assert_eq!(collector.counter("width"), 0);
}

#[test]
fn test_set_counter() {
    let collector = MetricsCollector::new();
    collector.set_counter("operations", 100);
    assert_eq!(collector.counter("operations"), 100);

    // Overwrite with new value
    collector.set_counter("operations", 200);
    assert_eq!(collector.counter("operations"), 200);
}

#[test]
fn test_clones_share_state() {
    let collector = MetricsCollector::new();
    let other = collector.clone();
    std::thread::spawn(move || other.increment_counter("shared", 3))
        .join()
        .unwrap();
    assert_eq!(collector.counter("shared"), 3);
}

#[test]
fn test_elapsed_time() {
    use std::thread;
    use std::time::Duration;

    let collector = MetricsCollector::new();

    // No time recorded yet
    assert!(collector.elapsed().is_none());

    collector.record_start();
    thread::sleep(Duration::from_millis(50));
    // A second start (another channel) does not move the start time.
    collector.record_start();
    collector.record_end();

    let elapsed = collector.elapsed();
    assert!(elapsed.is_some());
    assert!(elapsed.unwrap().as_millis() >= 50);
}

#[test]
fn test_to_json_with_execution_time() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("test", 42)));

    collector.record_start();
    collector.record_end();

    let json = collector.to_json();
    assert_eq!(json["test"]["value"], json!(42));
    assert!(json["execution_time_ms"]["value"].is_number());
}

#[test]
fn test_to_json_without_execution_time() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("count", 100)));

    let json = collector.to_json();
    assert_eq!(json["count"]["value"], json!(100));
    assert!(json.get("execution_time_ms").is_none());
}

#[test]
fn test_print_metrics() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(
        GaugeMetric::new("temp", 98.6).with_description("Temperature"),
    ));

    // Just ensure it doesn't panic
    collector.print();
}

#[test]
fn test_save_to_file() -> Result<()> {
    let dir = TempDirPath::new()?;
    let file_path = dir.input("metrics.json");

    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("saved", 123)));
    collector.save_to_file(&file_path)?;

    let contents = std::fs::read_to_string(&file_path)?;
    let parsed: serde_json::Value = serde_json::from_str(&contents)?;
    assert_eq!(parsed["saved"]["value"], json!(123));
    Ok(())
}

#[test]
fn test_save_to_missing_directory_fails() {
    let collector = MetricsCollector::new();
    let err = collector
        .save_to_file("/nonexistent/dir/metrics.json")
        .unwrap_err();
    assert!(matches!(err, ironsplit::Error::Io { .. }));
}

#[test]
fn test_counter_metric_accessors() {
    let counter = CounterMetric::new("new_counter").with_description("Fresh");
    counter.add(2);
    assert_eq!(counter.name(), "new_counter");
    assert_eq!(counter.value(), json!(2));
    assert_eq!(counter.get(), 2);
    assert_eq!(counter.description(), Some("Fresh"));
}

#[test]
fn test_gauge_metric_with_description() {
    let gauge = GaugeMetric::new("memory", 1024.0).with_description("Memory usage in MB");
    assert_eq!(gauge.name(), "memory");
    assert_eq!(gauge.value(), json!(1024.0));
    assert_eq!(gauge.description(), Some("Memory usage in MB"));
}

#[test]
fn test_reader_run_counters() -> Result<()> {
    let files: Vec<(String, Vec<u8>)> = (0..4)
        .map(|i| (format!("/in/f{i}.txt"), format!("a{i}\nb{i}\nc{i}\n").into_bytes()))
        .collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, d)| (p.as_str(), d.as_slice()))
        .collect();
    let total_bytes: u64 = files.iter().map(|(_, d)| d.len() as u64).sum();

    let collector = MetricsCollector::new();
    let ctx = OperatorContext::new("metrics")
        .register_filesystem(mock_memory_fs(&refs, 1024))
        .metrics(collector.clone());
    run_channels(&ReaderParams::new(["mem:///in"]), &ctx, &key_value_schema(), 3)?;

    assert_eq!(collector.counter(SPLITS_TOTAL), 4);
    assert_eq!(collector.counter(SPLITS_ASSIGNED), 4);
    assert_eq!(collector.counter(SPLITS_READ), 4);
    assert_eq!(collector.counter(WINDOW_MARKERS), 4);
    assert_eq!(collector.counter(RECORDS_EMITTED), 12);
    assert_eq!(collector.counter(BYTES_CONSUMED), total_bytes);
    assert_eq!(collector.snapshot().get("channels").unwrap(), &json!(3.0));
    assert!(collector.elapsed().is_some());
    Ok(())
}
