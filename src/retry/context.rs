// src/retry/context.rs

/// Per-request retry bookkeeping.
///
/// Values are never mutated in place: each retry or failover produces a new
/// context that is handed to the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    attempts: u32,
    retries: u32,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            attempts: 1,
            retries: 0,
        }
    }

    /// Backends already routed to for this request, counting the current one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Same-backend retries issued on the current hop.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn next_retry(self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self
        }
    }

    /// A failover moves to a new backend, so the retry counter starts over.
    pub fn next_attempt(self) -> Self {
        Self {
            attempts: self.attempts + 1,
            retries: 0,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_first_attempt_without_retries() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.attempts(), 1);
        assert_eq!(ctx.retries(), 0);
    }

    #[test]
    fn failover_resets_retries() {
        let ctx = RequestContext::new().next_retry().next_retry();
        assert_eq!(ctx.retries(), 2);
        assert_eq!(ctx.attempts(), 1);

        let next = ctx.next_attempt();
        assert_eq!(next.attempts(), 2);
        assert_eq!(next.retries(), 0);
        // the original value is untouched
        assert_eq!(ctx.retries(), 2);
    }
}
