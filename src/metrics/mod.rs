//! Request and layer telemetry.
//!
//! Recording is append-only and partitioned per service, so concurrent
//! fetches never contend on a shared lock with each other's services and the
//! crawl never waits on a reader. Aggregation (percentiles, totals) happens
//! only when [`MetricsCollector::report`] is called.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::fetch::Service;

/// Per-service counters and latency samples.
#[derive(Debug, Default)]
struct ServiceCounters {
    ok: AtomicU64,
    err: AtomicU64,
    retries: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
}

/// Statistics for one completed BFS layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerMetrics {
    /// Depth of the nodes discovered by this layer.
    pub depth: u32,
    /// Frontier items expanded at the start of the layer.
    pub frontier: usize,
    /// Raw references returned by the reference sources.
    pub seen: usize,
    /// References removed by the normalizer before mapping.
    pub filtered: usize,
    /// References removed by the citation-count threshold (either stage).
    pub pruned: usize,
    /// References that could not be mapped and were dropped.
    pub unmapped_dropped: usize,
    /// References that produced a node and edge.
    pub kept: usize,
    /// Nodes queued for expansion in the next layer.
    pub expanded: usize,
    /// Tasks that failed outright (reference list fetch errors, panics).
    pub failed: usize,
    /// Layer wall time in seconds.
    pub wall_secs: f64,
    /// Sum of per-task durations in seconds.
    pub task_secs: f64,
    /// `task_secs / wall_secs`, absent when the layer took no measurable time.
    pub effective_parallelism: Option<f64>,
    /// `seen / wall_secs`.
    pub refs_per_sec: Option<f64>,
}

impl LayerMetrics {
    /// Fills in the timing-derived fields.
    pub fn finish(&mut self, wall: Duration, task_total: Duration) {
        self.wall_secs = wall.as_secs_f64();
        self.task_secs = task_total.as_secs_f64();
        if self.wall_secs > 0.0 {
            self.effective_parallelism = Some(self.task_secs / self.wall_secs);
            #[allow(clippy::cast_precision_loss)]
            let rps = self.seen as f64 / self.wall_secs;
            self.refs_per_sec = Some(rps);
        }
    }
}

/// Aggregated view of one service's calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceReport {
    pub ok: u64,
    pub err: u64,
    pub retries: u64,
    pub mean_secs: Option<f64>,
    pub p50_secs: Option<f64>,
    pub p95_secs: Option<f64>,
}

/// Full metrics report produced at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub services: BTreeMap<Service, ServiceReport>,
    pub layers: Vec<LayerMetrics>,
    pub wall_clock_secs: f64,
}

/// Shared, lock-light metrics sink.
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    openalex: ServiceCounters,
    semantic_scholar: ServiceCounters,
    layers: Mutex<Vec<LayerMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Creates a collector; the wall clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            openalex: ServiceCounters::default(),
            semantic_scholar: ServiceCounters::default(),
            layers: Mutex::new(Vec::new()),
        }
    }

    fn counters(&self, service: Service) -> &ServiceCounters {
        match service {
            Service::OpenAlex => &self.openalex,
            Service::SemanticScholar => &self.semantic_scholar,
        }
    }

    /// Records one HTTP attempt.
    pub fn record_call(&self, service: Service, latency: Duration, ok: bool) {
        let counters = self.counters(service);
        if ok {
            counters.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.err.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut samples) = counters.latencies.lock() {
            samples.push(latency);
        }
    }

    /// Records that a failed attempt is being retried.
    pub fn record_retry(&self, service: Service) {
        self.counters(service).retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends a completed layer's statistics.
    pub fn record_layer(&self, layer: LayerMetrics) {
        if let Ok(mut layers) = self.layers.lock() {
            layers.push(layer);
        }
    }

    /// Number of successful calls recorded for `service`.
    #[must_use]
    pub fn ok_count(&self, service: Service) -> u64 {
        self.counters(service).ok.load(Ordering::Relaxed)
    }

    /// Number of failed calls recorded for `service`.
    #[must_use]
    pub fn err_count(&self, service: Service) -> u64 {
        self.counters(service).err.load(Ordering::Relaxed)
    }

    /// Snapshot of the layers recorded so far.
    #[must_use]
    pub fn layers(&self) -> Vec<LayerMetrics> {
        self.layers.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Builds the aggregate report.
    #[must_use]
    pub fn report(&self) -> MetricsReport {
        let services = Service::ALL
            .into_iter()
            .map(|service| (service, self.service_report(service)))
            .collect();
        MetricsReport {
            services,
            layers: self.layers(),
            wall_clock_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    fn service_report(&self, service: Service) -> ServiceReport {
        let counters = self.counters(service);
        let mut samples: Vec<f64> = counters
            .latencies
            .lock()
            .map(|s| s.iter().map(Duration::as_secs_f64).collect())
            .unwrap_or_default();
        samples.sort_by(f64::total_cmp);

        #[allow(clippy::cast_precision_loss)]
        let mean = (!samples.is_empty()).then(|| samples.iter().sum::<f64>() / samples.len() as f64);

        ServiceReport {
            ok: counters.ok.load(Ordering::Relaxed),
            err: counters.err.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            mean_secs: mean,
            p50_secs: percentile(&samples, 50.0),
            p95_secs: percentile(&samples, 95.0),
        }
    }
}

/// Nearest-rank percentile over sorted samples: index `round(p/100 * (n-1))`.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let last = sorted.len() - 1;
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let index = ((p / 100.0) * last as f64).round().max(0.0) as usize;
    sorted.get(index.min(last)).copied()
}
