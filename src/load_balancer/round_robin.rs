// src/load_balancer/round_robin.rs
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared rotation cursor.
///
/// Concurrent callers never reserve a slot, so two selections racing each
/// other may land on non-adjacent positions. Fairness is approximate.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(position: usize) -> Self {
        Self {
            counter: AtomicUsize::new(position),
        }
    }

    /// Increment the cursor, then reduce the new value modulo `len`.
    pub fn next_index(&self, len: usize) -> usize {
        debug_assert!(len > 0);
        let next = self.counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        next % len
    }

    /// Move the cursor so the next selection starts just after `index`.
    /// Racing hints overwrite each other.
    pub fn hint(&self, index: usize) {
        self.counter.store(index, Ordering::SeqCst);
    }

    pub fn position(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}
