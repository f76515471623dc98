// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Text exposition format.
    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub requests_exhausted_total: IntCounterVec,

    // Backend metrics
    pub backend_requests_total: IntCounterVec,
    pub backend_request_duration_seconds: HistogramVec,
    pub retries_total: IntCounterVec,
    pub failovers_total: IntCounterVec,
    pub backend_alive: IntGaugeVec,

    // Pool metrics
    pub alive_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds, retries and failovers included",
            ),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let requests_exhausted_total = IntCounterVec::new(
            Opts::new(
                "lb_requests_exhausted_total",
                "Requests answered with service unavailable",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(requests_exhausted_total.clone()))?;

        let backend_requests_total = IntCounterVec::new(
            Opts::new("lb_backend_requests_total", "Total backend requests"),
            &["backend", "status"],
        )?;
        registry.register(Box::new(backend_requests_total.clone()))?;

        let backend_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_backend_request_duration_seconds",
                "Backend request duration",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_request_duration_seconds.clone()))?;

        let retries_total = IntCounterVec::new(
            Opts::new("lb_retries_total", "Same-backend retries"),
            &["backend"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let failovers_total = IntCounterVec::new(
            Opts::new("lb_failovers_total", "Backends abandoned after exhausting retries"),
            &["backend"],
        )?;
        registry.register(Box::new(failovers_total.clone()))?;

        let backend_alive = IntGaugeVec::new(
            Opts::new("lb_backend_alive", "Backend liveness (1=alive, 0=dead)"),
            &["backend"],
        )?;
        registry.register(Box::new(backend_alive.clone()))?;

        let alive_backends = IntGauge::new("lb_alive_backends", "Number of alive backends")?;
        registry.register(Box::new(alive_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            requests_exhausted_total,
            backend_requests_total,
            backend_request_duration_seconds,
            retries_total,
            failovers_total,
            backend_alive,
            alive_backends,
            total_backends,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status])
            .observe(duration.as_secs_f64());
    }

    pub fn record_exhausted(&self, reason: &str) {
        self.requests_exhausted_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_backend_request(
        &self,
        backend: &str,
        success: bool,
        duration: std::time::Duration,
    ) {
        let status = if success { "success" } else { "failure" };
        self.backend_requests_total
            .with_label_values(&[backend, status])
            .inc();

        self.backend_request_duration_seconds
            .with_label_values(&[backend])
            .observe(duration.as_secs_f64());
    }

    pub fn record_retry(&self, backend: &str) {
        self.retries_total.with_label_values(&[backend]).inc();
    }

    pub fn record_failover(&self, backend: &str) {
        self.failovers_total.with_label_values(&[backend]).inc();
    }

    pub fn update_backend_health(&self, backend: &str, alive: bool) {
        let value = if alive { 1 } else { 0 };
        self.backend_alive.with_label_values(&[backend]).set(value);
    }

    pub fn update_backend_counts(&self, alive: usize, total: usize) {
        self.alive_backends.set(alive as i64);
        self.total_backends.set(total as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
