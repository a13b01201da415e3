//! Process-wide counters/gauges/histograms for jobs, actions, queues, and
//! workers (§4.7), plus the per-worker/queue/system snapshot shapes (§3).
//!
//! `hook_common::metrics` wires the `metrics` facade crate straight into
//! `metrics-exporter-prometheus` for scraping — write-only from the
//! process's own point of view. This collector additionally requires
//! synchronous readback (`get_metric_summary`, `get_all_metrics`),
//! which a Prometheus exporter doesn't serve, so the collector owns its
//! bounded sample history directly, behind the same `std::sync::RwLock`
//! style `HealthRegistry` uses for its own component map.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;

/// `counter | gauge | histogram` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// `{value, timestamp, tags}` (§3).
#[derive(Debug, Clone)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct MetricSeries {
    kind: MetricType,
    samples: VecDeque<Sample>,
}

/// `{count, sum, avg, min, max, latest}`, computed on demand (§3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
}

/// A process-wide metrics store. Multiple concurrent writers are supported
/// via one `RwLock` per collector instance; callers needing a single shared
/// instance per process should go through `global()` below.
pub struct MetricsCollector {
    series: RwLock<HashMap<String, MetricSeries>>,
    default_retention: usize,
}

impl MetricsCollector {
    pub fn new(default_retention: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            default_retention,
        }
    }

    fn record(&self, name: &str, kind: MetricType, value: f64, tags: Option<HashMap<String, String>>) {
        let sample = Sample {
            value,
            timestamp: Utc::now(),
            tags: tags.unwrap_or_default(),
        };

        let mut series = self.series.write().expect("metrics lock poisoned");
        let entry = series.entry(name.to_owned()).or_insert_with(|| MetricSeries {
            kind,
            samples: VecDeque::new(),
        });
        entry.samples.push_back(sample);
        if entry.samples.len() > self.default_retention {
            entry.samples.pop_front();
        }
    }

    pub fn increment(&self, name: &str, value: f64, tags: Option<HashMap<String, String>>) {
        self.record(name, MetricType::Counter, value, tags);
    }

    pub fn gauge(&self, name: &str, value: f64, tags: Option<HashMap<String, String>>) {
        self.record(name, MetricType::Gauge, value, tags);
    }

    pub fn histogram(&self, name: &str, value: f64, tags: Option<HashMap<String, String>>) {
        self.record(name, MetricType::Histogram, value, tags);
    }

    /// All samples currently retained for `name`, oldest first.
    pub fn get_metric(&self, name: &str) -> Option<(MetricType, Vec<Sample>)> {
        let series = self.series.read().expect("metrics lock poisoned");
        series
            .get(name)
            .map(|s| (s.kind, s.samples.iter().cloned().collect()))
    }

    pub fn get_all_metrics(&self) -> Vec<String> {
        let series = self.series.read().expect("metrics lock poisoned");
        series.keys().cloned().collect()
    }

    /// Trims every metric to its most recent `keep` samples. `keep == 0`
    /// empties the list but retains the metric entry.
    pub fn clear_old_metrics(&self, keep: usize) {
        let mut series = self.series.write().expect("metrics lock poisoned");
        for entry in series.values_mut() {
            while entry.samples.len() > keep {
                entry.samples.pop_front();
            }
        }
    }

    /// `None` if the metric is absent or has zero samples.
    pub fn get_metric_summary(&self, name: &str) -> Option<MetricSummary> {
        let series = self.series.read().expect("metrics lock poisoned");
        let entry = series.get(name)?;
        if entry.samples.is_empty() {
            return None;
        }

        let count = entry.samples.len();
        let sum: f64 = entry.samples.iter().map(|s| s.value).sum();
        let min = entry.samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
        let max = entry
            .samples
            .iter()
            .map(|s| s.value)
            .fold(f64::NEG_INFINITY, f64::max);
        let latest = entry.samples.back().expect("checked non-empty above").value;

        Some(MetricSummary {
            count,
            sum,
            avg: sum / count as f64,
            min,
            max,
            latest,
        })
    }
}

static GLOBAL_METRICS: OnceCell<Arc<MetricsCollector>> = OnceCell::new();

/// The process-wide singleton instance (§4.7). Callers must `init_global`
/// once at startup before any worker records a metric; the engine itself
/// never initializes this implicitly so embedding processes keep explicit
/// control over when the singleton comes into being.
pub fn init_global(default_retention: usize) -> Arc<MetricsCollector> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(MetricsCollector::new(default_retention)))
        .clone()
}

/// Fetches the process-wide singleton, initializing it with the default
/// retention of 100 samples if no one has called `init_global` yet.
pub fn global() -> Arc<MetricsCollector> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(MetricsCollector::new(100)))
        .clone()
}

fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Purpose-built helpers over a `MetricsCollector`, one for each ambient
/// measurement the worker/action pipeline needs to record (§4.7).
pub struct WorkerMetrics {
    collector: Arc<MetricsCollector>,
}

impl WorkerMetrics {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    /// Records `worker.job.processing_time` plus `worker.job.{success,failure}`,
    /// the latter pair always incremented 1/0 so summaries reflect an
    /// accurate success rate.
    pub fn record_job_processing_time(&self, operation: &str, duration_ms: f64, success: bool) {
        let op_tags = tags(&[("operation", operation)]);
        self.collector
            .histogram("worker.job.processing_time", duration_ms, Some(op_tags.clone()));
        self.collector.increment(
            "worker.job.total",
            1.0,
            Some(op_tags.clone()),
        );
        self.collector.increment(
            "worker.job.success",
            if success { 1.0 } else { 0.0 },
            Some(op_tags.clone()),
        );
        self.collector
            .increment("worker.job.failure", if success { 0.0 } else { 1.0 }, Some(op_tags));
    }

    /// Records `worker.action.execution_time` plus `worker.action.{success,failure}`.
    pub fn record_action_execution_time(&self, action_name: &str, duration_ms: f64, success: bool) {
        let action_tags = tags(&[("action", action_name)]);
        self.collector.histogram(
            "worker.action.execution_time",
            duration_ms,
            Some(action_tags.clone()),
        );
        self.collector
            .increment("worker.action.total", 1.0, Some(action_tags.clone()));
        self.collector.increment(
            "worker.action.success",
            if success { 1.0 } else { 0.0 },
            Some(action_tags.clone()),
        );
        self.collector.increment(
            "worker.action.failure",
            if success { 0.0 } else { 1.0 },
            Some(action_tags),
        );
    }

    pub fn record_queue_depth(&self, queue_name: &str, depth: f64) {
        self.collector
            .gauge("worker.queue.depth", depth, Some(tags(&[("queue", queue_name)])));
    }

    pub fn record_worker_status(&self, worker_name: &str, running: bool) {
        self.collector.gauge(
            "worker.status",
            if running { 1.0 } else { 0.0 },
            Some(tags(&[("worker", worker_name)])),
        );
    }
}

/// Per-worker record (§3).
#[derive(Debug, Clone)]
pub struct WorkerMetricsSnapshot {
    pub worker_id: String,
    pub queue_name: String,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub average_processing_time_ms: f64,
    pub last_job_time: Option<DateTime<Utc>>,
    pub uptime_ms: u128,
}

/// Per-queue record (§3).
#[derive(Debug, Clone)]
pub struct QueueMetricsSnapshot {
    pub queue_name: String,
    pub job_count: u64,
    pub waiting_count: u64,
    pub active_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over all workers and queues (§3).
#[derive(Debug, Clone)]
pub struct SystemMetricsSnapshot {
    pub workers: Vec<WorkerMetricsSnapshot>,
    pub queues: Vec<QueueMetricsSnapshot>,
    pub system_uptime_ms: u128,
    pub memory_usage_bytes: u64,
    pub cpu_usage_percent: f64,
}
