//! One-shot future resolved from whichever thread completes the call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use callbridge_types::CallError;

type CancelHook = Box<dyn Fn() + Send + Sync + 'static>;

enum Resolution<T> {
    Pending(Option<Waker>),
    Resolved(Result<T, CallError>),
    /// The result was returned from `poll`.
    Consumed { failed: bool },
}

struct Shared<T> {
    resolution: Mutex<Resolution<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Resolution<T>> {
        self.resolution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a linked completer/future pair.
///
/// `on_cancel` runs when [`CallFuture::cancel`] is called (or the future is dropped) while
/// still pending. It is expected to resolve the completer, typically by canceling the call
/// the completer is listening to.
pub fn channel<T>(on_cancel: impl Fn() + Send + Sync + 'static) -> (Completer<T>, CallFuture<T>) {
    let shared = Arc::new(Shared {
        resolution: Mutex::new(Resolution::Pending(None)),
    });
    let completer = Completer {
        shared: Some(Arc::clone(&shared)),
    };
    let future = CallFuture {
        shared,
        on_cancel: Box::new(on_cancel),
    };
    (completer, future)
}

/// The write side of a [`CallFuture`]. Consumed by [`Completer::resolve`], so a future is
/// resolved at most once.
pub struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Completer<T> {
    /// Resolve the future and wake the task awaiting it. Callable from any thread.
    pub fn resolve(mut self, result: Result<T, CallError>) {
        if let Some(shared) = self.shared.take() {
            resolve(&shared, result);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            resolve(&shared, Err(CallError::Abandoned));
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}

fn resolve<T>(shared: &Shared<T>, result: Result<T, CallError>) {
    let mut resolution = shared.lock();
    let waker = match std::mem::replace(&mut *resolution, Resolution::Resolved(result)) {
        Resolution::Pending(waker) => waker,
        previous => {
            // Only one Completer exists per future; restore rather than overwrite.
            *resolution = previous;
            return;
        }
    };
    drop(resolution);
    if let Some(waker) = waker {
        waker.wake();
    }
}

/// Awaitable handle for one call.
///
/// Resolves to the adapted value, or to the error that ended the call. Dropping the handle
/// while it is still pending cancels the call.
pub struct CallFuture<T> {
    shared: Arc<Shared<T>>,
    on_cancel: CancelHook,
}

impl<T> CallFuture<T> {
    /// Cancel the underlying call if this future has not resolved yet.
    ///
    /// After resolution this is a no-op: the delivered outcome stands and the call is not
    /// marked canceled.
    ///
    /// That holds once the resolution is visible to the caller, i.e. after
    /// [`is_completed`](Self::is_completed) returned true or the future was polled to
    /// completion. A cancel racing the delivery may still run the hook and flag the call as
    /// canceled, but it never replaces an outcome that was delivered first.
    pub fn cancel(&self) {
        if self.is_completed() {
            return;
        }
        (self.on_cancel)();
    }

    pub fn is_completed(&self) -> bool {
        !matches!(*self.shared.lock(), Resolution::Pending(_))
    }

    pub fn is_completed_exceptionally(&self) -> bool {
        match &*self.shared.lock() {
            Resolution::Pending(_) => false,
            Resolution::Resolved(result) => result.is_err(),
            Resolution::Consumed { failed } => *failed,
        }
    }

    /// True if the future resolved with [`CallError::Canceled`] and the result has not been
    /// taken yet.
    pub fn is_canceled(&self) -> bool {
        matches!(
            &*self.shared.lock(),
            Resolution::Resolved(Err(CallError::Canceled))
        )
    }
}

impl<T> Future for CallFuture<T> {
    type Output = Result<T, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut resolution = self.shared.lock();
        match &mut *resolution {
            Resolution::Pending(waker) => {
                if waker.as_ref().is_none_or(|w| !w.will_wake(cx.waker())) {
                    *waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
            Resolution::Resolved(result) => {
                let failed = result.is_err();
                match std::mem::replace(&mut *resolution, Resolution::Consumed { failed }) {
                    Resolution::Resolved(result) => Poll::Ready(result),
                    _ => unreachable!("resolution checked above"),
                }
            }
            Resolution::Consumed { .. } => panic!("CallFuture polled after completion"),
        }
    }
}

impl<T> Drop for CallFuture<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> fmt::Debug for CallFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFuture")
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}
