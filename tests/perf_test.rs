use std::time::Duration;

use ar_offline_engine::config::MetricThresholds;
use ar_offline_engine::engine::perf::{MetricCategory, PerformanceMonitor};

#[tokio::test]
async fn test_slow_frame_yields_one_warning() {
    let monitor = PerformanceMonitor::new(MetricThresholds::default());

    let id = monitor.start_metric(MetricCategory::Rendering, "frame");
    tokio::time::sleep(Duration::from_millis(20)).await;
    monitor.end_metric(&id);

    let warnings = monitor.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].id, id.to_string());
    assert_eq!(warnings[0].threshold_ms, 16);
    assert!(warnings[0].duration_ms >= 20);

    let metric = &monitor.get_metrics()[0];
    assert_eq!(metric.duration_ms, Some(warnings[0].duration_ms));
    assert_eq!(
        metric.end_time_ms,
        Some(metric.start_time_ms + warnings[0].duration_ms as i64)
    );
}

#[test]
fn test_second_end_is_ignored() {
    let monitor = PerformanceMonitor::new(MetricThresholds {
        rendering_ms: 0,
        ..Default::default()
    });

    let id = monitor.start_metric(MetricCategory::Rendering, "frame");
    std::thread::sleep(Duration::from_millis(2));
    monitor.end_metric(&id);
    let first = monitor.get_metrics()[0].clone();

    std::thread::sleep(Duration::from_millis(5));
    monitor.end_metric(&id);

    assert_eq!(monitor.get_metrics()[0], first);
    assert_eq!(monitor.warnings().len(), 1);
}

#[test]
fn test_unknown_id_is_ignored() {
    let other = PerformanceMonitor::default();
    let foreign = other.start_metric(MetricCategory::ModelLoading, "house_model");

    let monitor = PerformanceMonitor::default();
    monitor.end_metric(&foreign);

    assert!(monitor.get_metrics().is_empty());
    assert!(monitor.warnings().is_empty());
}

#[test]
fn test_metrics_snapshot_and_clear() {
    let monitor = PerformanceMonitor::default();

    let startup = monitor.start_metric(MetricCategory::ArInitialization, "startup");
    let model = monitor.start_metric(MetricCategory::ModelLoading, "house_model");
    monitor.end_metric(&startup);

    let metrics = monitor.get_metrics();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].name, "startup");
    assert!(metrics[0].is_ended());
    assert_eq!(metrics[1].category, MetricCategory::ModelLoading);
    assert!(!metrics[1].is_ended());

    monitor.clear_metrics();
    assert!(monitor.get_metrics().is_empty());

    // Ending a metric that was cleared is a no-op.
    monitor.end_metric(&model);
    assert!(monitor.get_metrics().is_empty());
}

#[test]
fn test_default_thresholds() {
    let monitor = PerformanceMonitor::default();
    assert_eq!(monitor.threshold_for(MetricCategory::ModelLoading), 3000);
    assert_eq!(monitor.threshold_for(MetricCategory::ArInitialization), 2000);
    assert_eq!(monitor.threshold_for(MetricCategory::Rendering), 16);
}
