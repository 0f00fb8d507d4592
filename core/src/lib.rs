//! Bridges callback-driven calls into awaitable, cancelable futures.
//!
//! # Architecture
//!
//! ```text
//! TypeDescriptor -> CallAdapterFactory::get -> CallAdapter::{Body, Response}
//!                                                     |
//!                              adapt(Arc<dyn Call<T>>)  v
//!   Call::enqueue(callback) <-------------------- Completer<_> / CallFuture<_>
//!            |                                          ^
//!            +-- exactly one Outcome<T> ----------------+
//! ```
//!
//! - [`Call`] - one in-flight exchange; delivers exactly one [`Outcome`] to one listener
//! - [`CompletableCall`] - the reference completion state machine, usable directly as a
//!   test double and embedded by transports
//! - [`CallFuture`] - the awaited handle; `cancel()` is forwarded to the call
//! - [`BodyCallAdapter`] / [`ResponseCallAdapter`] - unwrap the body, or hand back the envelope
//! - [`CallAdapterFactory`] - picks an adapter from a declared return type
//!
//! # Cancellation
//!
//! Canceling a [`CallFuture`] before it resolves cancels the underlying call, which
//! synchronously resolves the future with [`CallError::Canceled`]. Canceling after
//! resolution has no effect on the call.

mod adapter;
mod call;
mod completable;
mod factory;
mod future;

pub use adapter::{BodyCallAdapter, CallAdapter, ResponseCallAdapter};
pub use call::{Call, Callback, EnqueueError};
pub use completable::CompletableCall;
pub use factory::{CallAdapterFactory, DispatchError};
pub use future::{CallFuture, Completer, channel};

pub use callbridge_types::{
    CallError, CallErrorKind, CallStateError, ErrorBody, Headers, HttpError, Method, Outcome,
    Request, Response, TypeDescriptor,
};
