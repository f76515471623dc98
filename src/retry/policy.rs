// src/retry/policy.rs

use super::context::RequestContext;
use crate::config::RetryConfig;
use std::time::Duration;

/// What to do after an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Wait for the retry delay, then send to the same backend again.
    Retry(RequestContext),
    /// Mark the backend dead and route through the pool again.
    Failover(RequestContext),
}

/// Two caps enforced at two layers: `max_retries` bounds a single hop,
/// `max_attempts` bounds the number of backends a request may visit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            max_attempts: config.max_attempts,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a request carrying `ctx` may still be routed to a backend.
    pub fn admits(&self, ctx: RequestContext) -> bool {
        ctx.attempts() <= self.max_attempts
    }

    pub fn on_failure(&self, ctx: RequestContext) -> Escalation {
        if ctx.retries() < self.max_retries {
            Escalation::Retry(ctx.next_retry())
        } else {
            Escalation::Failover(ctx.next_attempt())
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
