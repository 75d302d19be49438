//! Cooperative cancellation
//!
//! Decode is single-threaded but long-running: transport reads can block
//! and key derivation is CPU-bound. A [`CancelToken`] is threaded through
//! both so another thread (typically a UI) can request an unwind. Checks
//! happen at the top of the structural parser's token loop (every 256
//! tokens, bounding the overhead) and between key-transform batches.
//!
//! Tripping the token makes the decode return `DecodeError::Cancelled`;
//! no partially populated tree is handed to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
