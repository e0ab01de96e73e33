//! HTTP Transport
//!
//! Request/response values and the `Sender` interface the pipeline sends through.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

use crate::core::{HEADER_CONTENT_TYPE, HEADER_REQUEST_ID};
use crate::error::{AzureError, AzureResult, ConfigurationError, ProtocolError, TransportError};

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Re-invocable body source.
pub type BodyFactory = Arc<dyn Fn() -> AzureResult<Bytes> + Send + Sync>;

/// One-shot reader body. The reader is handed out once.
#[derive(Clone)]
pub struct StreamBody {
    reader: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
    content_length: Option<u64>,
}

impl StreamBody {
    /// Wrap a reader with an optional declared length.
    pub fn new(reader: impl Read + Send + 'static, content_length: Option<u64>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
            content_length,
        }
    }

    /// Declared length, if known.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Take the reader. Returns `None` once consumed.
    pub fn take(&self) -> Option<Box<dyn Read + Send>> {
        self.reader.lock().take()
    }
}

/// Request body.
#[derive(Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// In-memory bytes, freely re-sendable.
    Bytes(Bytes),
    /// Factory producing a fresh copy of the body on each call.
    Factory(BodyFactory),
    /// One-shot stream.
    Stream(StreamBody),
}

impl Body {
    /// Body from a factory.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: Fn() -> AzureResult<Bytes> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Body from a one-shot reader.
    pub fn from_reader(reader: impl Read + Send + 'static, content_length: Option<u64>) -> Self {
        Self::Stream(StreamBody::new(reader, content_length))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    /// In-memory bytes, if the body is already buffered.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Length when known without reading.
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(b) => Some(b.len() as u64),
            Self::Factory(_) => None,
            Self::Stream(s) => s.content_length(),
        }
    }

    /// Materialize the body. Consumes a stream.
    pub fn into_bytes(self) -> AzureResult<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Factory(factory) => factory(),
            Self::Stream(stream) => read_stream(&stream),
        }
    }
}

/// Upper bound on the buffer reserved from a declared content length.
const MAX_PREALLOCATION: u64 = 1 << 20;

pub(crate) fn read_stream(stream: &StreamBody) -> AzureResult<Bytes> {
    let mut reader = stream.take().ok_or_else(|| TransportError::BodyRead {
        message: "request body stream was already consumed".to_string(),
    })?;
    let capacity = stream.content_length().unwrap_or(0).min(MAX_PREALLOCATION) as usize;
    let mut buffer = Vec::with_capacity(capacity);
    reader
        .read_to_end(&mut buffer)
        .map_err(|e| TransportError::BodyRead {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(buffer))
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Factory(_) => f.write_str("Factory"),
            Self::Stream(s) => write!(f, "Stream(content_length: {:?})", s.content_length()),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: Url,
    /// Request headers, keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Body,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Cancellation signal shared by every wait this request triggers.
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: Body::Empty,
            timeout: None,
            cancel: None,
        }
    }

    /// Create a request from a URL string.
    pub fn parse(method: HttpMethod, url: &str) -> AzureResult<Self> {
        let url = Url::parse(url).map_err(|e| ConfigurationError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(method, url))
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Return the request's cancellation token, attaching a fresh one if absent.
    pub fn ensure_cancel(&mut self) -> CancellationToken {
        self.cancel.get_or_insert_with(CancellationToken::new).clone()
    }

    /// Cancellation token, or a token that never fires.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone().unwrap_or_default()
    }

    /// Check whether the attached signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }

    /// Copy of the request with an empty body.
    pub fn without_body(&self) -> Self {
        Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: Body::Empty,
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        }
    }

    /// Buffered body as text, if the body is in memory.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// HTTP response definition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and content type.
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header(HEADER_CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Service-assigned request id.
    pub fn request_id(&self) -> Option<&str> {
        self.header(HEADER_REQUEST_ID)
    }

    /// Body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> AzureResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            AzureError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that turns a request into a response.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse>;
}

#[async_trait]
impl<S: Sender + ?Sized> Sender for Arc<S> {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        (**self).send(request).await
    }
}

/// Default reqwest-based sender.
pub struct ReqwestSender {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestSender {
    /// Create sender with default settings.
    pub fn new() -> AzureResult<Self> {
        Self::with_timeout(Duration::from_secs(60))
    }

    /// Create sender with a default request timeout.
    pub fn with_timeout(timeout: Duration) -> AzureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_timeout: Duration::from_secs(60),
        }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    async fn execute(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = self
            .client
            .request(Self::method(request.method), request.url.clone())
            .timeout(timeout);

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        let body = request.body.into_bytes()?;
        if !body.is_empty() {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout }
            } else if e.is_builder() {
                TransportError::InvalidRequest {
                    message: e.to_string(),
                }
            } else {
                TransportError::ConnectionFailed {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout }
            } else {
                TransportError::BodyRead {
                    message: e.to_string(),
                }
            }
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Sender for ReqwestSender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let cancel = request.cancel_token();
        if cancel.is_cancelled() {
            return Err(AzureError::cancelled("sending request"));
        }
        trace!(method = %request.method, url = %request.url, "Sending request");
        tokio::select! {
            _ = cancel.cancelled() => Err(AzureError::cancelled("sending request")),
            result = self.execute(request) => result,
        }
    }
}

/// Mock sender for testing. Queued replies are returned first in, first out.
#[derive(Default)]
pub struct MockSender {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    request_history: Mutex<Vec<HttpRequest>>,
    default_response: Mutex<Option<HttpResponse>>,
    latency: Mutex<Option<Duration>>,
}

impl MockSender {
    /// Create new mock sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.replies.lock().push_back(Ok(response));
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response<T: serde::Serialize>(&self, status: u16, body: &T) -> &Self {
        self.queue_response(HttpResponse::new(status).with_json(body))
    }

    /// Queue a transport failure.
    pub fn queue_error(&self, error: TransportError) -> &Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    /// Set default response when queue is empty.
    pub fn set_default_response(&self, response: HttpResponse) -> &Self {
        *self.default_response.lock() = Some(response);
        self
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Get request history.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.request_history.lock().clone()
    }

    /// Get last request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.request_history.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.request_history.lock().len()
    }

    /// Clear request history.
    pub fn clear_history(&self) {
        self.request_history.lock().clear();
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn send(&self, mut request: HttpRequest) -> AzureResult<HttpResponse> {
        let body = std::mem::take(&mut request.body).into_bytes()?;
        request.body = Body::Bytes(body);
        self.request_history.lock().push(request);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(error.into()),
            None => self.default_response.lock().clone().ok_or_else(|| {
                TransportError::ConnectionFailed {
                    message: "No mock response available".to_string(),
                }
                .into()
            }),
        }
    }
}

/// Create production sender.
pub fn create_sender(timeout: Option<Duration>) -> AzureResult<ReqwestSender> {
    match timeout {
        Some(t) => ReqwestSender::with_timeout(t),
        None => ReqwestSender::new(),
    }
}

/// Create mock sender for testing.
pub fn create_mock_sender() -> MockSender {
    MockSender::new()
}
