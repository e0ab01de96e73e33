//! Send Decorators
//!
//! Wrap a `Sender` with cross-cutting behavior. Decorators are applied in
//! order, so the last one listed is the outermost.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::core::transport::{HttpRequest, HttpResponse, Sender};
use crate::error::{AzureError, AzureResult};
use crate::resilience::retry::{send_with_retry, sleep_with_cancel, RetryPolicy};

/// Wraps one sender in another.
pub type SendDecorator = Box<dyn FnOnce(Arc<dyn Sender>) -> Arc<dyn Sender> + Send>;

/// Apply `decorators` to `sender`, first to last.
pub fn decorate_sender(sender: Arc<dyn Sender>, decorators: Vec<SendDecorator>) -> Arc<dyn Sender> {
    decorators
        .into_iter()
        .fold(sender, |inner, decorate| decorate(inner))
}

/// Send `request` through `sender` wrapped in `decorators`.
pub async fn send_with_sender(
    sender: Arc<dyn Sender>,
    request: HttpRequest,
    decorators: Vec<SendDecorator>,
) -> AzureResult<HttpResponse> {
    decorate_sender(sender, decorators).send(request).await
}

/// Sender backed by a closure.
pub struct SenderFn<F>(F);

#[async_trait]
impl<F> Sender for SenderFn<F>
where
    F: Fn(HttpRequest) -> BoxFuture<'static, AzureResult<HttpResponse>> + Send + Sync,
{
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        (self.0)(request).await
    }
}

/// Build a sender from a closure returning a boxed future.
pub fn sender_fn<F>(f: F) -> Arc<dyn Sender>
where
    F: Fn(HttpRequest) -> BoxFuture<'static, AzureResult<HttpResponse>> + Send + Sync + 'static,
{
    Arc::new(SenderFn(f))
}

struct DelaySender {
    inner: Arc<dyn Sender>,
    delay: Duration,
}

#[async_trait]
impl Sender for DelaySender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        if !sleep_with_cancel(self.delay, &request.cancel_token()).await {
            return Err(AzureError::cancelled("delaying request"));
        }
        self.inner.send(request).await
    }
}

/// Sleep `delay` before sending.
pub fn after_delay(delay: Duration) -> SendDecorator {
    Box::new(move |inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(DelaySender { inner, delay })
    })
}

struct RetrySender {
    inner: Arc<dyn Sender>,
    policy: RetryPolicy,
}

#[async_trait]
impl Sender for RetrySender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        send_with_retry(self.inner.as_ref(), request, &self.policy).await
    }
}

/// Retry per `policy`.
pub fn do_retry_for_status_codes(policy: RetryPolicy) -> SendDecorator {
    Box::new(move |inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(RetrySender { inner, policy })
    })
}

struct LoggingSender {
    inner: Arc<dyn Sender>,
}

#[async_trait]
impl Sender for LoggingSender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();
        let start = Instant::now();
        debug!(method = %method, url = %url, "Request");
        let result = self.inner.send(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => info!(
                method = %method,
                url = %url,
                status = response.status,
                request_id = response.request_id().unwrap_or(""),
                duration_ms = duration_ms,
                "Response"
            ),
            Err(error) => info!(
                method = %method,
                url = %url,
                error = %error,
                duration_ms = duration_ms,
                "Request failed"
            ),
        }
        result
    }
}

/// Log method, URL, status and duration of every exchange.
pub fn with_logging() -> SendDecorator {
    Box::new(|inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(LoggingSender { inner })
    })
}
