//! Cooperative cancellation for long-running per-cluster work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared flag checked periodically by the hull and clustering loops.
///
/// Clones share the same flag, so one handle can be given to worker code
/// while another is kept to request cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of all work holding a clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
