//! Metrics sink abstraction and exposition.
//!
//! # Responsibilities
//! - Define the narrow sink the lifecycle core reports into
//! - Forward sink calls to the `metrics` facade (Prometheus exporter)
//! - Provide silent and in-memory sinks
//!
//! # Metrics
//! - `service.api.panic.total` (counter): handler panics caught by the guard
//! - `service.api.shutdown.<trigger>` (counter): listen cycles ended per trigger
//! - `rust.<identity>.*` (gauges, durations): runtime samples
//!
//! # Design Decisions
//! - The core only writes; it never reads a metric back
//! - Keys are dotted; the Prometheus exporter sanitizes them on render

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Counter incremented once per handler panic.
pub const METRIC_PANIC_COUNTER: &str = "service.api.panic.total";

/// Prefix of the per-trigger shutdown counters.
pub const METRIC_SHUTDOWN_PREFIX: &str = "service.api.shutdown";

/// Write-only metrics capability consumed by the listener, the panic guard
/// and the runtime sampler.
///
/// Implementations must be safe to call concurrently from request tasks and
/// background tasks.
pub trait Metrics: Send + Sync {
    /// Increment a named counter by one.
    fn increment(&self, key: &str);

    /// Record the current value of a named gauge.
    fn gauge(&self, key: &str, value: f64);

    /// Record a named duration.
    fn duration(&self, key: &str, value: Duration);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMetrics;

impl Metrics for NopMetrics {
    fn increment(&self, _key: &str) {}

    fn gauge(&self, _key: &str, _value: f64) {}

    fn duration(&self, _key: &str, _value: Duration) {}
}

/// Sink backed by the global `metrics` recorder.
///
/// Durations are recorded into histograms in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

impl Metrics for FacadeMetrics {
    fn increment(&self, key: &str) {
        metrics::counter!(key.to_owned()).increment(1);
    }

    fn gauge(&self, key: &str, value: f64) {
        metrics::gauge!(key.to_owned()).set(value);
    }

    fn duration(&self, key: &str, value: Duration) {
        metrics::histogram!(key.to_owned()).record(value.as_secs_f64());
    }
}

/// One call made against an [`InMemoryMetrics`] sink.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Increment(String),
    Gauge(String, f64),
    Duration(String, Duration),
}

impl MetricEvent {
    /// Key the call was made with.
    pub fn key(&self) -> &str {
        match self {
            MetricEvent::Increment(key)
            | MetricEvent::Gauge(key, _)
            | MetricEvent::Duration(key, _) => key,
        }
    }
}

/// Sink that keeps every call in memory, in call order.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded calls.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.lock().clone()
    }

    /// Number of calls recorded for `key`, whatever their kind.
    pub fn count(&self, key: &str) -> usize {
        self.lock().iter().filter(|e| e.key() == key).count()
    }

    /// Total number of recorded calls.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricEvent>> {
        // A poisoned buffer still holds valid events.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: MetricEvent) {
        self.lock().push(event);
    }
}

impl Metrics for InMemoryMetrics {
    fn increment(&self, key: &str) {
        self.push(MetricEvent::Increment(key.to_owned()));
    }

    fn gauge(&self, key: &str, value: f64) {
        self.push(MetricEvent::Gauge(key.to_owned(), value));
    }

    fn duration(&self, key: &str, value: Duration) {
        self.push(MetricEvent::Duration(key.to_owned(), value));
    }
}

/// Install the Prometheus recorder and serve its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}
