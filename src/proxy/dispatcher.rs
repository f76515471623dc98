// ────────────────────────────────
// src/proxy/dispatcher.rs
// Per-request entry point: pick a live backend, forward, retry or fail over.
// ────────────────────────────────

use super::backend::Backend;
use super::error::ProxyError;
use super::forward::ForwardRequest;
use super::pool::BackendPool;
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::{Escalation, RequestContext, RetryPolicy};
use hyper::{Body, Request, Response};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub struct Dispatcher {
    pool: Arc<BackendPool>,
    policy: RetryPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<BackendPool>,
        policy: RetryPolicy,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            pool,
            policy,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Handle one inbound request with a fresh retry context.
    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let span = tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let timer = Timer::new();
            let method = req.method().clone();

            let result = match ForwardRequest::from_request(req).await {
                Ok(request) => self.dispatch(&request, RequestContext::new()).await,
                Err(err) => Err(err),
            };

            if let Some(metrics) = &self.metrics {
                let status = match &result {
                    Ok(response) => response.status(),
                    Err(err) => err.status(),
                };
                metrics.record_request(method.as_str(), status.as_u16(), timer.elapsed());
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Route `request` until a backend answers or the attempt cap is hit.
    pub async fn dispatch(
        &self,
        request: &ForwardRequest,
        mut ctx: RequestContext,
    ) -> Result<Response<Body>, ProxyError> {
        loop {
            if !self.policy.admits(ctx) {
                warn!(
                    client = ?request.client_addr(),
                    method = %request.method(),
                    path = %request.uri().path(),
                    "Max attempts reached, terminating"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_exhausted("max_attempts");
                }
                return Err(ProxyError::AttemptsExhausted(self.policy.max_attempts()));
            }

            let Some(peer) = self.pool.next_live_peer().await else {
                warn!(attempt = ctx.attempts(), "No live backend to route to");
                if let Some(metrics) = &self.metrics {
                    metrics.record_exhausted("no_live_backend");
                }
                return Err(ProxyError::NoLiveBackends);
            };

            debug!(backend = %peer.id, attempt = ctx.attempts(), "Routing request");
            match self.forward(&peer, request, ctx).await {
                Ok(response) => return Ok(response),
                Err(next) => ctx = next,
            }
        }
    }

    /// Drive a single hop. On failover the backend has already been marked
    /// dead and the context for the next attempt is returned as the error.
    async fn forward(
        &self,
        peer: &Backend,
        request: &ForwardRequest,
        mut ctx: RequestContext,
    ) -> Result<Response<Body>, RequestContext> {
        loop {
            let timer = Timer::new();
            let result = peer.forwarder().forward(request).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_backend_request(&peer.id, result.is_ok(), timer.elapsed());
            }

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            warn!(backend = %peer.id, error = %err, retries = ctx.retries(), "Upstream request failed");

            match self.policy.on_failure(ctx) {
                Escalation::Retry(next) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(&peer.id);
                    }
                    tokio::time::sleep(self.policy.retry_delay()).await;
                    ctx = next;
                }
                Escalation::Failover(next) => {
                    self.pool.set_alive(peer.address(), false).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failover(&peer.id);
                        metrics.update_backend_health(&peer.id, false);
                        metrics.update_backend_counts(self.pool.alive_count().await, self.pool.len());
                    }
                    info!(
                        backend = %peer.id,
                        attempt = next.attempts(),
                        "Backend marked down, failing over"
                    );
                    return Err(next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::metrics::MetricsRegistry;
    use crate::proxy::Forward;
    use async_trait::async_trait;
    use hyper::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Fails the first `failures` calls, then answers with its own name.
    struct ScriptedForwarder {
        name: &'static str,
        failures: usize,
        calls: AtomicUsize,
    }

    impl ScriptedForwarder {
        fn new(name: &'static str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Forward for ScriptedForwarder {
        async fn forward(&self, _request: &ForwardRequest) -> Result<Response<Body>, ProxyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ProxyError::Timeout)
            } else {
                Ok(Response::new(Body::from(self.name)))
            }
        }
    }

    fn backend(port: u16, forwarder: Arc<ScriptedForwarder>) -> Arc<Backend> {
        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        Arc::new(Backend::new(url, forwarder))
    }

    fn dispatcher(backends: Vec<Arc<Backend>>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(BackendPool::new(backends)),
            RetryPolicy::new(&RetryConfig {
                max_retries: 3,
                retry_delay_ms: 1,
                max_attempts: 3,
            }),
            None,
        )
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn transient_failures_are_retried_on_the_same_backend() {
        let flaky = ScriptedForwarder::new("b1", 2);
        let dispatcher = dispatcher(vec![backend(9001, flaky.clone())]);

        let response = dispatcher.handle(get("/")).await.unwrap();

        assert_eq!(body_text(response).await, "b1");
        assert_eq!(flaky.calls(), 3);
        assert!(dispatcher.pool().backends()[0].is_alive().await);
    }

    #[tokio::test]
    async fn fourth_failure_marks_backend_dead_and_fails_over() {
        let broken = ScriptedForwarder::new("b1", usize::MAX);
        let healthy = ScriptedForwarder::new("b2", 0);
        // cursor starts at 0, so the first selection is index 1
        let dispatcher = dispatcher(vec![
            backend(9002, healthy.clone()),
            backend(9001, broken.clone()),
        ]);

        let response = dispatcher.handle(get("/")).await.unwrap();

        assert_eq!(body_text(response).await, "b2");
        assert_eq!(broken.calls(), 4);
        assert_eq!(healthy.calls(), 1);
        assert!(!dispatcher.pool().backends()[1].is_alive().await);
    }

    #[tokio::test]
    async fn gives_up_after_three_backends() {
        let forwarders: Vec<_> = (0..4)
            .map(|_| ScriptedForwarder::new("never", usize::MAX))
            .collect();
        let backends = forwarders
            .iter()
            .enumerate()
            .map(|(i, f)| backend(9100 + i as u16, f.clone()))
            .collect();
        let dispatcher = dispatcher(backends);

        let err = dispatcher.handle(get("/")).await.unwrap_err();

        assert!(matches!(err, ProxyError::AttemptsExhausted(3)));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        let calls: Vec<_> = forwarders.iter().map(|f| f.calls()).collect();
        assert_eq!(calls.iter().sum::<usize>(), 12);
        assert_eq!(calls.iter().filter(|&&c| c == 4).count(), 3);
        assert_eq!(dispatcher.pool().alive_count().await, 1);
    }

    #[tokio::test]
    async fn single_failing_backend_ends_with_no_live_backend() {
        let broken = ScriptedForwarder::new("b1", usize::MAX);
        let dispatcher = dispatcher(vec![backend(9001, broken.clone())]);

        let err = dispatcher.handle(get("/")).await.unwrap_err();

        assert!(matches!(err, ProxyError::NoLiveBackends));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(broken.calls(), 4);
    }

    #[tokio::test]
    async fn exhausted_context_never_touches_the_pool() {
        let healthy = ScriptedForwarder::new("b1", 0);
        let dispatcher = dispatcher(vec![backend(9001, healthy.clone())]);
        let request = ForwardRequest::from_request(get("/")).await.unwrap();
        let ctx = RequestContext::new().next_attempt().next_attempt().next_attempt();

        let err = dispatcher.dispatch(&request, ctx).await.unwrap_err();

        assert!(matches!(err, ProxyError::AttemptsExhausted(_)));
        assert_eq!(healthy.calls(), 0);
    }

    #[tokio::test]
    async fn records_metrics_for_retries_and_failovers() {
        let registry = MetricsRegistry::new().unwrap();
        let broken = ScriptedForwarder::new("b1", usize::MAX);
        let healthy = ScriptedForwarder::new("b2", 0);
        let dispatcher = Dispatcher::new(
            Arc::new(BackendPool::new(vec![
                backend(9002, healthy),
                backend(9001, broken),
            ])),
            RetryPolicy::default(),
            Some(registry.collector()),
        );

        dispatcher.handle(get("/")).await.unwrap();

        let collector = registry.collector();
        assert_eq!(collector.retries_total.with_label_values(&["127.0.0.1:9001"]).get(), 3);
        assert_eq!(collector.failovers_total.with_label_values(&["127.0.0.1:9001"]).get(), 1);
        assert_eq!(
            collector.requests_total.with_label_values(&["GET", "200"]).get(),
            1
        );
        // refreshed on failover, without waiting for a sweep
        assert_eq!(collector.alive_backends.get(), 1);
        assert_eq!(collector.total_backends.get(), 2);
    }
}
