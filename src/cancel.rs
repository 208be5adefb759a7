//! Cooperative cancellation for scans and feeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation handle shared between a caller and in-flight
/// store operations.
///
/// The store client is expected to observe the token on every read and
/// surface [`SyncError::Cancelled`](crate::SyncError::Cancelled) once it
/// is set; this crate adds no timers of its own.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; clones observe it immediately.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
