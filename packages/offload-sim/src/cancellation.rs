//! Cooperative cancellation token (supplemented feature, SPEC_FULL 4).
//!
//! A lock-free `Arc<AtomicBool>` handle, the same style as the teacher's
//! process-wide atomic counters — cheap to clone, cheap to poll, no
//! blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable handle that can signal cancellation from outside the
/// simulation loop. Polled at the cooperative-yield cadence of spec.md 5
/// (every 10 slots).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
