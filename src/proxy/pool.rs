// src/proxy/pool.rs
use super::backend::Backend;
use super::forward::{build_client, HttpForwarder};
use crate::config::Config;
use crate::load_balancer::RoundRobin;
use std::sync::Arc;

/// Fixed, ordered set of backends plus the shared rotation cursor.
/// Backends are never added or removed after construction; only their
/// liveness changes.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    cursor: RoundRobin,
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self::with_cursor(backends, RoundRobin::new())
    }

    pub fn with_cursor(backends: Vec<Arc<Backend>>, cursor: RoundRobin) -> Self {
        Self { backends, cursor }
    }

    /// One `HttpForwarder` per configured backend, all sharing a client.
    pub fn from_config(config: &Config) -> Self {
        let client = build_client();
        let backends = config
            .backends
            .iter()
            .map(|backend| {
                let forwarder = HttpForwarder::new(
                    backend.url.clone(),
                    client.clone(),
                    config.proxy.timeout(),
                );
                tracing::info!(backend = %backend.url, "Configured backend");
                Arc::new(Backend::new(backend.url.clone(), Arc::new(forwarder)))
            })
            .collect();

        Self::new(backends)
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Update the liveness of the backend with this normalised address.
    /// Unknown addresses are ignored.
    pub async fn set_alive(&self, address: &str, alive: bool) {
        let Some(backend) = self.backends.iter().find(|b| b.address() == address) else {
            return;
        };

        let was_alive = backend.set_alive(alive).await;
        if was_alive != alive {
            let status = if alive { "up" } else { "down" };
            tracing::info!(backend = %backend.id, status, "Backend liveness changed");
        }
    }

    /// Next alive backend in rotation, or `None` if every backend is dead.
    ///
    /// The result is best-effort: liveness may flip right after it is read.
    pub async fn next_live_peer(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor.next_index(len);
        for offset in 0..len {
            let index = (start + offset) % len;
            let backend = &self.backends[index];
            if backend.is_alive().await {
                if index != start {
                    self.cursor.hint(index);
                }
                return Some(backend.clone());
            }
        }

        None
    }

    pub async fn alive_count(&self) -> usize {
        let mut alive = 0;
        for backend in &self.backends {
            if backend.is_alive().await {
                alive += 1;
            }
        }
        alive
    }
}
