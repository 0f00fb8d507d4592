//! The response envelope delivered by a completed exchange.

use std::fmt;

use crate::Headers;

/// Raw body of an unsuccessful response.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(content_type: Option<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type,
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Debug for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBody")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload<T> {
    Body(Option<T>),
    Error(ErrorBody),
}

/// A completed HTTP exchange: status, reason, headers, and either a typed body or an error body.
///
/// Successful responses (2xx) carry an optional typed body; all others carry an [`ErrorBody`].
/// The envelope is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    status: u16,
    reason: String,
    headers: Headers,
    payload: Payload<T>,
}

impl<T> Response<T> {
    /// `200 OK` carrying `body`.
    #[must_use]
    pub fn success(body: T) -> Self {
        Self::success_with(200, Headers::new(), Some(body))
    }

    /// Successful response with an explicit status.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not in `200..=299`.
    #[must_use]
    pub fn success_with(status: u16, headers: Headers, body: Option<T>) -> Self {
        assert!(
            (200..300).contains(&status),
            "status must be 2xx for a successful response (got {status})"
        );
        Self {
            status,
            reason: default_reason(status).to_string(),
            headers,
            payload: Payload::Body(body),
        }
    }

    /// Unsuccessful response carrying `body` as its error body.
    ///
    /// # Panics
    ///
    /// Panics if `status` is 2xx.
    #[must_use]
    pub fn error(status: u16, body: ErrorBody) -> Self {
        assert!(
            !(200..300).contains(&status),
            "status must not be 2xx for an error response (got {status})"
        );
        Self {
            status,
            reason: default_reason(status).to_string(),
            headers: Headers::new(),
            payload: Payload::Error(body),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub const fn is_successful(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&T> {
        match &self.payload {
            Payload::Body(body) => body.as_ref(),
            Payload::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match &self.payload {
            Payload::Body(_) => None,
            Payload::Error(body) => Some(body),
        }
    }

    #[must_use]
    pub fn into_body(self) -> Option<T> {
        match self.payload {
            Payload::Body(body) => body,
            Payload::Error(_) => None,
        }
    }

    /// Drop the typed body, keeping status, reason, headers and any error body.
    #[must_use]
    pub fn without_body(self) -> Response<()> {
        let payload = match self.payload {
            Payload::Body(body) => Payload::Body(body.map(|_| ())),
            Payload::Error(err) => Payload::Error(err),
        };
        Response {
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            payload,
        }
    }

    /// Apply `f` to the typed body, leaving everything else untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        let payload = match self.payload {
            Payload::Body(body) => Payload::Body(body.map(f)),
            Payload::Error(err) => Payload::Error(err),
        };
        Response {
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            payload,
        }
    }
}

/// Reason phrase used when the transport does not supply one.
pub(crate) fn default_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        200..=299 => "Success",
        400..=499 => "Client Error",
        500..=599 => "Server Error",
        _ => "Response",
    }
}
