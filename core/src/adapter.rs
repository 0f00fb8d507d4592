//! Result-shape bridges from a [`Call`] to a [`CallFuture`].

use std::panic::Location;
use std::sync::Arc;

use callbridge_types::{CallError, HttpError, Outcome, Response, TypeDescriptor};

use crate::call::{Call, Callback};
use crate::future::{self, CallFuture};

/// Adapter selected for a declared return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAdapter {
    /// `CallFuture<T>`: resolves with the body, fails on non-2xx.
    Body(BodyCallAdapter),
    /// `CallFuture<Response<T>>`: resolves with the whole envelope.
    Response(ResponseCallAdapter),
}

impl CallAdapter {
    /// Type the transport must decode response bodies into.
    #[must_use]
    pub fn response_type(&self) -> &TypeDescriptor {
        match self {
            Self::Body(adapter) => adapter.response_type(),
            Self::Response(adapter) => adapter.response_type(),
        }
    }

    #[must_use]
    pub fn as_body(&self) -> Option<&BodyCallAdapter> {
        match self {
            Self::Body(adapter) => Some(adapter),
            Self::Response(_) => None,
        }
    }

    #[must_use]
    pub fn as_response(&self) -> Option<&ResponseCallAdapter> {
        match self {
            Self::Response(adapter) => Some(adapter),
            Self::Body(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyCallAdapter {
    response_type: TypeDescriptor,
}

impl BodyCallAdapter {
    #[must_use]
    pub fn new(response_type: TypeDescriptor) -> Self {
        Self { response_type }
    }

    #[must_use]
    pub fn response_type(&self) -> &TypeDescriptor {
        &self.response_type
    }

    /// Enqueue `call` and return a future for its body.
    ///
    /// A non-2xx envelope resolves the future with [`CallError::Http`], which records the
    /// caller's location as its [`HttpError::call_site`]. Transport failures and cancellation
    /// are passed through unchanged.
    #[track_caller]
    pub fn adapt<T, C>(&self, call: Arc<C>) -> CallFuture<T>
    where
        T: Send + 'static,
        C: Call<T> + ?Sized + 'static,
    {
        let call_site = Location::caller();
        bridge(call, move |outcome| body_of(outcome, call_site))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCallAdapter {
    response_type: TypeDescriptor,
}

impl ResponseCallAdapter {
    #[must_use]
    pub fn new(response_type: TypeDescriptor) -> Self {
        Self { response_type }
    }

    #[must_use]
    pub fn response_type(&self) -> &TypeDescriptor {
        &self.response_type
    }

    /// Enqueue `call` and return a future for its envelope, successful or not.
    #[track_caller]
    pub fn adapt<T, C>(&self, call: Arc<C>) -> CallFuture<Response<T>>
    where
        T: Send + 'static,
        C: Call<T> + ?Sized + 'static,
    {
        bridge(call, |outcome| outcome)
    }
}

fn body_of<T>(
    outcome: Outcome<T>,
    call_site: &'static Location<'static>,
) -> Result<T, CallError> {
    let response = outcome?;
    if !response.is_successful() {
        return Err(HttpError::new(response).with_call_site(call_site).into());
    }
    let status = response.status();
    response.into_body().ok_or(CallError::MissingBody { status })
}

/// Wire `call`'s single outcome into a fresh future, mapped through `adapt`.
fn bridge<T, U, C, F>(call: Arc<C>, adapt: F) -> CallFuture<U>
where
    T: Send + 'static,
    U: Send + 'static,
    C: Call<T> + ?Sized + 'static,
    F: FnOnce(Outcome<T>) -> Result<U, CallError> + Send + 'static,
{
    let cancel_target = Arc::clone(&call);
    let (completer, future) = future::channel(move || cancel_target.cancel());

    let callback: Callback<T> = Box::new(move |outcome| completer.resolve(adapt(outcome)));
    if let Err(rejected) = call.enqueue(callback) {
        tracing::debug!(url = %call.request().url, reason = %rejected.reason, "Call refused listener");
        (rejected.callback)(Err(rejected.reason.into()));
    }
    future
}
