//! [`Call`] implementation that performs the exchange with reqwest on a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use callbridge_core::{Call, Callback, CompletableCall, EnqueueError};
use callbridge_types::{CallError, ErrorBody, Headers, Method, Outcome, Request, Response};
use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::convert::Converter;
use crate::retry::{self, RetryConfig, RetryOutcome};

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Everything needed to perform one request, shared with the spawned task.
struct Exchange<T> {
    client: reqwest::Client,
    runtime: Handle,
    retry: RetryConfig,
    request: Request,
    converter: Arc<dyn Converter<T>>,
}

impl<T> Clone for Exchange<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            retry: self.retry.clone(),
            request: self.request.clone(),
            converter: Arc::clone(&self.converter),
        }
    }
}

/// A single HTTP request as a [`Call`].
///
/// The exchange starts on the first `enqueue` or `execute` and runs on the client's tokio
/// runtime. Completion bookkeeping is delegated to a [`CompletableCall`], so the outcome
/// is delivered exactly once whether it comes from the network or from [`Call::cancel`].
pub struct HttpCall<T> {
    exchange: Arc<Exchange<T>>,
    state: Arc<CompletableCall<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> HttpCall<T> {
    pub(crate) fn new(
        client: reqwest::Client,
        runtime: Handle,
        retry: RetryConfig,
        request: Request,
        converter: Arc<dyn Converter<T>>,
    ) -> Self {
        Self::from_exchange(Exchange {
            client,
            runtime,
            retry,
            request,
            converter,
        })
    }

    fn from_exchange(exchange: Exchange<T>) -> Self {
        Self {
            state: Arc::new(CompletableCall::with_request(exchange.request.clone())),
            exchange: Arc::new(exchange),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the exchange unless it already ran or the call already has an outcome.
    fn start(&self) {
        let mut task = self.task();
        if task.is_some() || self.state.is_completed() {
            return;
        }
        let exchange = Arc::clone(&self.exchange);
        let state = Arc::clone(&self.state);
        *task = Some(self.exchange.runtime.spawn(async move {
            let guard = DeliveryGuard::new(state);
            let outcome = exchange.perform().await;
            if !guard.deliver(outcome) {
                tracing::trace!(url = %exchange.request.url, "Exchange finished after cancel");
            }
        }));
    }
}

/// Delivers [`CallError::Abandoned`] if the exchange task ends without an outcome: it
/// panicked, or the runtime dropped it.
struct DeliveryGuard<T> {
    state: Option<Arc<CompletableCall<T>>>,
}

impl<T> DeliveryGuard<T> {
    fn new(state: Arc<CompletableCall<T>>) -> Self {
        Self { state: Some(state) }
    }

    fn deliver(mut self, outcome: Outcome<T>) -> bool {
        self.state
            .take()
            .is_some_and(|state| state.deliver(outcome))
    }
}

impl<T> Drop for DeliveryGuard<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take()
            && state.deliver(Err(CallError::Abandoned))
        {
            tracing::warn!("Exchange ended without an outcome");
        }
    }
}

impl<T: Send + 'static> Call<T> for HttpCall<T> {
    fn request(&self) -> &Request {
        &self.exchange.request
    }

    fn enqueue(&self, callback: Callback<T>) -> Result<(), EnqueueError<T>> {
        self.state.enqueue(callback)?;
        self.start();
        Ok(())
    }

    /// Blocks the calling thread. Do not call from inside an async task running on the
    /// client's runtime.
    fn execute(&self) -> Outcome<T> {
        if !self.state.is_executed() && !self.state.is_enqueued() {
            self.start();
        }
        self.state.execute()
    }

    fn cancel(&self) {
        self.state.cancel();
        if let Some(task) = self.task().take() {
            task.abort();
        }
    }

    fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    fn clone_call(&self) -> Box<dyn Call<T>> {
        Box::new(Self::from_exchange((*self.exchange).clone()))
    }
}

impl<T> std::fmt::Debug for HttpCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCall")
            .field("method", &self.exchange.request.method)
            .field("url", &self.exchange.request.url)
            .finish_non_exhaustive()
    }
}

impl<T> Exchange<T> {
    fn build(&self) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(reqwest_method(self.request.method), &self.request.url);
        for (name, value) in self.request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &self.request.body {
            builder = builder.body(body.clone());
        }
        builder
    }

    async fn perform(&self) -> Outcome<T> {
        tracing::debug!(
            method = %self.request.method,
            url = %self.request.url,
            "Sending request"
        );
        let response = match retry::send_with_retry(|| self.build(), &self.retry).await {
            RetryOutcome::Response(response) => response,
            RetryOutcome::ConnectionError { attempts, source } => {
                tracing::debug!(attempts, error = %source, "Request failed after retries");
                return Err(CallError::transport(source));
            }
            RetryOutcome::NonRetryable(source) => {
                tracing::debug!(error = %source, "Request failed");
                return Err(CallError::transport(source));
            }
        };
        self.read(response).await
    }

    async fn read(&self, response: reqwest::Response) -> Outcome<T> {
        let status = response.status();
        let code = status.as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();
        tracing::debug!(status = code, url = %self.request.url, "Received response");

        let envelope = if status.is_success() {
            let bytes = response.bytes().await.map_err(CallError::transport)?;
            // 204 and 205 carry no content by definition.
            let body = if matches!(code, 204 | 205) {
                None
            } else {
                Some(self.converter.convert(&bytes)?)
            };
            Response::success_with(code, headers, body)
        } else {
            let content_type = headers.get("content-type").map(str::to_owned);
            let bytes = read_capped_body(response)
                .await
                .map_err(CallError::transport)?;
            Response::error(code, ErrorBody::new(content_type, bytes)).with_headers(headers)
        };

        // reqwest does not expose the status line's own phrase.
        Ok(match status.canonical_reason() {
            Some(reason) => envelope.with_reason(reason),
            None => envelope,
        })
    }
}

async fn read_capped_body(response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            break;
        }
    }
    Ok(body)
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}
