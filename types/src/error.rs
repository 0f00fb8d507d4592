//! Errors surfaced to whoever awaits a call.

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;

use thiserror::Error;

use crate::{ErrorBody, Headers, Response};

/// A non-2xx response surfaced as an error by the body adapter.
///
/// Holds the whole envelope (minus the typed body, which an error response never has) so
/// callers can inspect status, headers, and error body.
///
/// The reason phrase is the envelope's, which HTTP transports fill with the canonical
/// phrase for the status (`404 Not Found`), not the text the server put on its status line.
#[derive(Clone, PartialEq, Eq, Error)]
#[error("HTTP {} {}", .response.status(), .response.reason())]
pub struct HttpError {
    response: Response<()>,
    call_site: Option<&'static Location<'static>>,
}

impl HttpError {
    #[must_use]
    pub fn new<T>(response: Response<T>) -> Self {
        Self {
            response: response.without_body(),
            call_site: None,
        }
    }

    /// Record the source location that started waiting for this response.
    #[must_use]
    pub fn with_call_site(mut self, call_site: &'static Location<'static>) -> Self {
        self.call_site = Some(call_site);
        self
    }

    /// Where the failed call was adapted into a future, when known.
    #[must_use]
    pub fn call_site(&self) -> Option<&'static Location<'static>> {
        self.call_site
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status()
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        self.response.reason()
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        self.response.headers()
    }

    #[must_use]
    pub fn error_body(&self) -> Option<&ErrorBody> {
        self.response.error_body()
    }

    #[must_use]
    pub fn response(&self) -> &Response<()> {
        &self.response
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status())
            .field("reason", &self.reason())
            .field("call_site", &self.call_site)
            .finish_non_exhaustive()
    }
}

/// Misuse of the one-shot call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallStateError {
    #[error("Already executed")]
    AlreadyExecuted,
    #[error("Already enqueued")]
    AlreadyEnqueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The call was canceled before an outcome existed.
    Canceled,
    Http,
    Io,
    Transport,
    MissingBody,
    State,
    Abandoned,
}

/// Every way awaiting a call can fail.
///
/// Transport failures are stored as they were raised; use [`std::error::Error::source`] or
/// [`CallError::transport_source`] to reach the original error.
#[derive(Debug, Error)]
pub enum CallError {
    /// The call was canceled. This is the interrupted kind: it travels the same
    /// failure channel as transport errors.
    #[error("canceled")]
    Canceled,
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transport(Box<dyn StdError + Send + Sync + 'static>),
    /// A successful response arrived without the body the caller declared.
    #[error("response {status} has no body but a body was expected")]
    MissingBody { status: u16 },
    #[error(transparent)]
    State(#[from] CallStateError),
    /// The call, or the task driving it, went away without ever producing an outcome.
    #[error("call was dropped before it produced an outcome")]
    Abandoned,
}

impl CallError {
    pub fn transport(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(error))
    }

    #[must_use]
    pub const fn kind(&self) -> CallErrorKind {
        match self {
            Self::Canceled => CallErrorKind::Canceled,
            Self::Http(_) => CallErrorKind::Http,
            Self::Io(_) => CallErrorKind::Io,
            Self::Transport(_) => CallErrorKind::Transport,
            Self::MissingBody { .. } => CallErrorKind::MissingBody,
            Self::State(_) => CallErrorKind::State,
            Self::Abandoned => CallErrorKind::Abandoned,
        }
    }

    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    #[must_use]
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }

    /// Where the failed call was adapted, for errors that record it.
    #[must_use]
    pub fn call_site(&self) -> Option<&'static Location<'static>> {
        self.as_http().and_then(HttpError::call_site)
    }

    /// The boxed transport error, if this is a transport failure.
    #[must_use]
    pub fn transport_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
