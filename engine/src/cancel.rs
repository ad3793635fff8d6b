//! Cooperative cancellation.
//!
//! The applier checks the token at the start of every apply attempt, so a
//! cancelled batch stops before its next transaction begins. Blocking store
//! and lease implementations should also observe the token and surface
//! their own `Cancelled` errors; transactions are atomic, so cancellation
//! never leaves a half-applied record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between a caller and the applier.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
