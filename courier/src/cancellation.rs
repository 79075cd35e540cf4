use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Signals cooperative cancellation of an in-flight dispatch.
///
/// Clones share the same flag: cancelling any clone cancels them all. The
/// dispatcher checks the token before entering each pipeline step and before
/// invoking the handler, and behaviors receive it so long-running steps can
/// bail out early.
///
/// # Examples
/// ```
/// use courier::CancellationToken;
///
/// let token = CancellationToken::new();
/// let shared = token.clone();
/// assert!(!shared.is_cancelled());
///
/// token.cancel();
/// assert!(shared.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Constructs a token that is not cancelled.
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
