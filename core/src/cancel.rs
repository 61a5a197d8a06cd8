//! Cooperative cancellation (§5).
//!
//! Mirrors the teacher's `is_running: Arc<AtomicBool>` flag
//! (`lcore/monitor.rs`): no operation blocks on it, callers just poll it at
//! the suspension points the design calls out — between stream extractions
//! and between matcher buckets — and discard partial results rather than
//! persist them.

use std::sync::atomic::{AtomicBool, Ordering};

/// A cooperative cancellation flag shared across threads.
#[derive(Debug, Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_latches() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
