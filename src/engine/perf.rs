// Performance instrumentation — timed operations by category with threshold warnings.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::MetricThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricCategory {
    ModelLoading,
    ArInitialization,
    Rendering,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::ModelLoading => "modelLoading",
            MetricCategory::ArInitialization => "arInitialization",
            MetricCategory::Rendering => "rendering",
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`PerformanceMonitor::start_metric`]. Unique per monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    pub seq: u64,
    pub category: MetricCategory,
    pub name: String,
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.category, self.name, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetricRecord {
    pub id: String,
    pub category: MetricCategory,
    pub name: String,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub duration_ms: Option<u64>,
}

impl PerformanceMetricRecord {
    pub fn is_ended(&self) -> bool {
        self.end_time_ms.is_some()
    }
}

/// A metric that ran longer than its category threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdExceeded {
    pub id: String,
    pub category: MetricCategory,
    pub name: String,
    pub duration_ms: u64,
    pub threshold_ms: u64,
}

struct ActiveMetric {
    record: PerformanceMetricRecord,
    started: Instant,
}

#[derive(Default)]
struct Registry {
    metrics: HashMap<u64, ActiveMetric>,
    /// Start order, for stable snapshots.
    order: Vec<u64>,
    warnings: Vec<ThresholdExceeded>,
}

/// In-memory registry of timed operations. Nothing here is persisted.
pub struct PerformanceMonitor {
    thresholds: MetricThresholds,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
    registry: Mutex<Registry>,
}

impl PerformanceMonitor {
    pub fn new(thresholds: MetricThresholds) -> Self {
        Self::with_clock(thresholds, Arc::new(SystemClock))
    }

    pub fn with_clock(thresholds: MetricThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            thresholds,
            clock,
            next_seq: AtomicU64::new(0),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn threshold_for(&self, category: MetricCategory) -> u64 {
        match category {
            MetricCategory::ModelLoading => self.thresholds.model_loading_ms,
            MetricCategory::ArInitialization => self.thresholds.ar_initialization_ms,
            MetricCategory::Rendering => self.thresholds.rendering_ms,
        }
    }

    pub fn start_metric(&self, category: MetricCategory, name: &str) -> MetricId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = MetricId {
            seq,
            category,
            name: name.to_string(),
        };
        let metric = ActiveMetric {
            record: PerformanceMetricRecord {
                id: id.to_string(),
                category,
                name: name.to_string(),
                start_time_ms: self.clock.now_epoch_ms(),
                end_time_ms: None,
                duration_ms: None,
            },
            started: Instant::now(),
        };

        let mut registry = self.registry.lock();
        registry.metrics.insert(seq, metric);
        registry.order.push(seq);
        id
    }

    /// Stop the clock on a metric. Unknown or already-ended ids are ignored.
    pub fn end_metric(&self, id: &MetricId) {
        let elapsed_ms;
        let record = {
            let mut registry = self.registry.lock();
            let Some(metric) = registry
                .metrics
                .get_mut(&id.seq)
                .filter(|m| m.record.category == id.category && m.record.name == id.name)
            else {
                debug!("end_metric for unknown id {}", id);
                return;
            };
            if metric.record.is_ended() {
                debug!("end_metric called twice for {}", id);
                return;
            }
            elapsed_ms = metric.started.elapsed().as_millis() as u64;
            metric.record.end_time_ms =
                Some(metric.record.start_time_ms + elapsed_ms as i64);
            metric.record.duration_ms = Some(elapsed_ms);
            metric.record.clone()
        };

        let threshold_ms = self.threshold_for(record.category);
        if elapsed_ms > threshold_ms {
            warn!(
                "performance warning: {} - {} took {}ms (threshold: {}ms)",
                record.category, record.name, elapsed_ms, threshold_ms
            );
            self.registry.lock().warnings.push(ThresholdExceeded {
                id: record.id,
                category: record.category,
                name: record.name,
                duration_ms: elapsed_ms,
                threshold_ms,
            });
        }
    }

    /// All recorded metrics, started and ended, in start order.
    pub fn get_metrics(&self) -> Vec<PerformanceMetricRecord> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|seq| registry.metrics.get(seq))
            .map(|metric| metric.record.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<ThresholdExceeded> {
        self.registry.lock().warnings.clone()
    }

    pub fn clear_metrics(&self) {
        let mut registry = self.registry.lock();
        registry.metrics.clear();
        registry.order.clear();
        registry.warnings.clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MetricThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_within_same_tick() {
        let monitor = PerformanceMonitor::default();
        let a = monitor.start_metric(MetricCategory::Rendering, "frame");
        let b = monitor.start_metric(MetricCategory::Rendering, "frame");

        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(monitor.get_metrics().len(), 2);
    }

    #[test]
    fn test_fast_metric_has_no_warning() {
        let monitor = PerformanceMonitor::default();
        let id = monitor.start_metric(MetricCategory::ModelLoading, "house_model");
        monitor.end_metric(&id);

        let metrics = monitor.get_metrics();
        assert_eq!(metrics.len(), 1);
        assert!(metrics[0].is_ended());
        assert!(monitor.warnings().is_empty());
    }

    #[test]
    fn test_category_display_matches_wire_name() {
        assert_eq!(MetricCategory::ArInitialization.to_string(), "arInitialization");
        assert_eq!(
            serde_json::to_string(&MetricCategory::ModelLoading).unwrap(),
            "\"modelLoading\""
        );
    }
}
