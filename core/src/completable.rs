//! Reference completion state machine for a single call.
//!
//! All state lives in one record behind one mutex. The blocking path waits on a condvar
//! tied to that mutex, released once when the first outcome is recorded. Listeners are
//! always invoked after the guard is dropped, so a listener may cancel or inspect the call
//! from inside its own invocation.

use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use callbridge_types::{CallError, CallStateError, Outcome, Request, Response};

use crate::call::{Call, Callback, EnqueueError};

const PLACEHOLDER_URL: &str = "http://example.com/";

enum Slot<T> {
    Pending,
    Ready(Outcome<T>),
    /// The outcome was handed to its single consumer.
    Taken,
}

impl<T> Slot<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    fn take_ready(&mut self) -> Option<Outcome<T>> {
        match mem::replace(self, Self::Taken) {
            Self::Ready(outcome) => Some(outcome),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct CallState<T> {
    executed: bool,
    enqueued: bool,
    canceled: bool,
    listener: Option<Callback<T>>,
    outcome: Slot<T>,
}

/// A [`Call`] completed by hand.
///
/// Transports embed it and report the exchange result through [`CompletableCall::deliver`];
/// tests drive it directly with [`complete`](CompletableCall::complete) and
/// [`complete_with_error`](CompletableCall::complete_with_error).
pub struct CompletableCall<T> {
    request: Request,
    state: Mutex<CallState<T>>,
    done: Condvar,
}

impl<T> Default for CompletableCall<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletableCall<T> {
    /// A call for a placeholder `GET` request.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request(Request::get(PLACEHOLDER_URL))
    }

    #[must_use]
    pub fn with_request(request: Request) -> Self {
        Self {
            request,
            state: Mutex::new(CallState {
                executed: false,
                enqueued: false,
                canceled: false,
                listener: None,
                outcome: Slot::Pending,
            }),
            done: Condvar::new(),
        }
    }

    /// Deliver a `200 OK` envelope carrying `body`.
    pub fn complete(&self, body: T) -> bool {
        self.complete_with_response(Response::success(body))
    }

    pub fn complete_with_response(&self, response: Response<T>) -> bool {
        self.deliver(Ok(response))
    }

    pub fn complete_with_error(&self, error: impl Into<CallError>) -> bool {
        self.deliver(Err(error.into()))
    }

    /// Record the terminal outcome and hand it to the listener, if one is registered.
    ///
    /// Returns `false`, dropping `outcome`, when an outcome already exists.
    pub fn deliver(&self, outcome: Outcome<T>) -> bool {
        let state = self.lock();
        if !state.outcome.is_pending() {
            tracing::debug!(url = %self.request.url, "Discarding outcome for already completed call");
            return false;
        }
        self.settle(state, outcome);
        true
    }

    /// True once an outcome has been recorded, whether or not it was consumed.
    pub fn is_completed(&self) -> bool {
        !self.lock().outcome.is_pending()
    }

    pub fn is_enqueued(&self) -> bool {
        self.lock().enqueued
    }

    /// Commit `outcome` under the guard, then release the guard before waking the blocking
    /// path or invoking the listener.
    fn settle(&self, mut state: MutexGuard<'_, CallState<T>>, outcome: Outcome<T>) {
        let handoff = match state.listener.take() {
            Some(listener) => {
                state.outcome = Slot::Taken;
                Some((listener, outcome))
            }
            None => {
                state.outcome = Slot::Ready(outcome);
                None
            }
        };
        drop(state);
        self.done.notify_all();

        if let Some((listener, outcome)) = handoff {
            tracing::trace!(url = %self.request.url, ok = outcome.is_ok(), "Delivering outcome");
            listener(outcome);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Call<T> for CompletableCall<T> {
    fn request(&self) -> &Request {
        &self.request
    }

    fn enqueue(&self, callback: Callback<T>) -> Result<(), EnqueueError<T>> {
        let mut state = self.lock();
        let rejected = if state.executed {
            Some(CallStateError::AlreadyExecuted)
        } else if state.enqueued {
            Some(CallStateError::AlreadyEnqueued)
        } else {
            None
        };
        if let Some(reason) = rejected {
            return Err(EnqueueError { reason, callback });
        }
        state.enqueued = true;

        if let Some(outcome) = state.outcome.take_ready() {
            drop(state);
            tracing::trace!(url = %self.request.url, "Listener registered after completion");
            callback(outcome);
        } else {
            state.listener = Some(callback);
        }
        Ok(())
    }

    fn execute(&self) -> Outcome<T> {
        let mut state = self.lock();
        if state.executed {
            return Err(CallStateError::AlreadyExecuted.into());
        }
        if state.enqueued {
            return Err(CallStateError::AlreadyEnqueued.into());
        }
        state.executed = true;

        let mut state = self
            .done
            .wait_while(state, |s| s.outcome.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        state
            .outcome
            .take_ready()
            .unwrap_or_else(|| Err(CallError::Abandoned))
    }

    fn cancel(&self) {
        let mut state = self.lock();
        if state.canceled {
            return;
        }
        state.canceled = true;
        tracing::trace!(url = %self.request.url, "Call canceled");

        if state.outcome.is_pending() {
            self.settle(state, Err(CallError::Canceled));
        }
    }

    fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    fn is_executed(&self) -> bool {
        self.lock().executed
    }

    fn clone_call(&self) -> Box<dyn Call<T>> {
        Box::new(Self::with_request(self.request.clone()))
    }
}
