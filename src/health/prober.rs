// src/health/prober.rs
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Periodically re-evaluates every backend and writes the result into the
/// pool. The prober is the only thing that marks a backend alive again.
pub struct HealthProber {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ProbeResult {
    pub backend_id: String,
    pub alive: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl HealthProber {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            config,
            pool,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Sweep every `interval` until shut down. The first sweep happens one
    /// full interval after start; until then backends keep their initial
    /// alive state.
    pub async fn start(self: Arc<Self>) {
        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        // a slow sweep swallows the ticks it overran
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Starting health prober with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("Start health checking");
                    self.sweep().await;
                    info!("Health check complete");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Health prober shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe all backends sequentially, in pool order.
    pub async fn sweep(&self) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(self.pool.len());

        for backend in self.pool.backends() {
            let result = self.probe(backend).await;
            self.pool.set_alive(backend.address(), result.alive).await;

            let status = if result.alive { "up" } else { "down" };
            match &result.error {
                None => info!(backend = %backend.url, status, "Probe result"),
                Some(error) => warn!(backend = %backend.url, status, %error, "Probe result"),
            }

            if let Some(metrics) = &self.metrics {
                metrics.update_backend_health(&backend.id, result.alive);
            }
            results.push(result);
        }

        if let Some(metrics) = &self.metrics {
            let alive = results.iter().filter(|r| r.alive).count();
            metrics.update_backend_counts(alive, results.len());
        }

        results
    }

    async fn probe(&self, backend: &Backend) -> ProbeResult {
        let start = std::time::Instant::now();
        let error = is_reachable(&backend.id, self.config.timeout()).await.err();

        ProbeResult {
            backend_id: backend.id.clone(),
            alive: error.is_none(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }
}

/// Bare TCP connect to `host:port`. Any failure, timeout included, is an error.
pub async fn is_reachable(authority: &str, limit: Duration) -> Result<(), String> {
    match timeout(limit, TcpStream::connect(authority)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {:?}", limit)),
    }
}
