//! HTTP transport for callbridge.
//!
//! [`HttpClient`] owns a pooled `reqwest::Client` and a tokio runtime handle, and hands
//! out [`HttpCall`]s: one-shot [`callbridge_core::Call`]s that perform the exchange with
//! retries and decode 2xx bodies through a [`Converter`].

mod call;
mod config;
mod convert;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use callbridge_types::Request;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};

pub use call::HttpCall;
pub use config::{ConfigError, HttpConfig, REQUEST_TIMEOUT_ENV, RetrySettings};
pub use convert::{BytesConverter, Converter, JsonConverter, StringConverter};
pub use retry::RetryConfig;

const TCP_KEEPALIVE_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("no tokio runtime to run calls on: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

fn client_builder(config: &HttpConfig) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("callbridge/", env!("CARGO_PKG_VERSION"))),
    );

    let builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .https_only(config.https_only)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Some(config.pool_idle_timeout()))
        .default_headers(default_headers);

    match config.request_timeout() {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}

/// Factory for [`HttpCall`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    runtime: Handle,
    config: Arc<HttpConfig>,
}

impl HttpClient {
    /// Build a client bound to the tokio runtime of the calling context.
    pub fn new(config: HttpConfig) -> Result<Self, ClientError> {
        Self::with_runtime(config, Handle::try_current()?)
    }

    /// Build a client whose calls run on `runtime`.
    pub fn with_runtime(config: HttpConfig, runtime: Handle) -> Result<Self, ClientError> {
        let inner = client_builder(&config)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            inner,
            runtime,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Resolve `path` against the configured base URL.
    ///
    /// Absolute `http(s)://` URLs and paths without a configured base are returned as-is.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        let is_absolute = path.starts_with("http://") || path.starts_with("https://");
        match self.config.base_url.as_deref() {
            Some(base) if !is_absolute => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            _ => path.to_string(),
        }
    }

    /// A GET request for `path`, resolved against the base URL.
    #[must_use]
    pub fn get(&self, path: &str) -> Request {
        Request::get(self.resolve(path))
    }

    /// A call for `request` whose 2xx bodies are decoded by `converter`.
    ///
    /// Nothing is sent until the call is enqueued or executed.
    pub fn new_call<T, C>(&self, request: Request, converter: C) -> HttpCall<T>
    where
        T: Send + 'static,
        C: Converter<T> + 'static,
    {
        HttpCall::new(
            self.inner.clone(),
            self.runtime.clone(),
            self.config.retry_config(),
            request,
            Arc::new(converter),
        )
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
