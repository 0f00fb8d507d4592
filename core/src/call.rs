use std::fmt;

use callbridge_types::{CallStateError, Outcome, Request};

/// Completion listener. Invoked at most once, with the call's terminal outcome.
pub type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

/// A refused [`Call::enqueue`]. The callback is handed back uninvoked.
pub struct EnqueueError<T> {
    pub reason: CallStateError,
    pub callback: Callback<T>,
}

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T> std::error::Error for EnqueueError<T> {}

/// One logical request whose outcome is delivered asynchronously, exactly once.
///
/// Implementations must guarantee:
/// - at most one terminal outcome, and it never changes once recorded;
/// - `enqueue` and `execute` are mutually exclusive and each usable once;
/// - a listener registered after the outcome exists is invoked before `enqueue` returns;
/// - `cancel` is idempotent and, when no outcome exists yet, synchronously delivers
///   `Err(CallError::Canceled)` to the registered listener;
/// - listeners are never invoked while internal locks are held.
pub trait Call<T>: Send + Sync {
    fn request(&self) -> &Request;

    /// Register the completion listener.
    fn enqueue(&self, callback: Callback<T>) -> Result<(), EnqueueError<T>>;

    /// Block the current thread until the outcome exists and return it.
    fn execute(&self) -> Outcome<T>;

    fn cancel(&self);

    fn is_canceled(&self) -> bool;

    fn is_executed(&self) -> bool;

    /// A fresh, never-started call for the same request.
    fn clone_call(&self) -> Box<dyn Call<T>>;
}
