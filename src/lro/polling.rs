//! Long-Running Operation Polling
//!
//! Follows `Azure-AsyncOperation` or `Location` until the operation reaches
//! a terminal state.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::core::{
    HttpMethod, HttpRequest, HttpResponse, SendDecorator, Sender, HEADER_ASYNC_OPERATION,
    HEADER_LOCATION,
};
use crate::error::{AzureError, AzureResult, PollingError, ProtocolError, ServiceError};
use crate::resilience::retry::{get_retry_after, sleep_with_cancel};
use crate::types::config::DEFAULT_POLLING_DELAY;

pub const OPERATION_IN_PROGRESS: &str = "InProgress";
pub const OPERATION_SUCCEEDED: &str = "Succeeded";
pub const OPERATION_FAILED: &str = "Failed";
pub const OPERATION_CANCELED: &str = "Canceled";

/// Polling delay and overall budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    /// Minimum delay between polls.
    pub delay: Duration,
    /// Overall budget. `None` polls until the operation is terminal.
    pub duration: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_POLLING_DELAY,
            duration: None,
        }
    }
}

impl PollingConfig {
    pub fn new(delay: Duration, duration: Option<Duration>) -> Self {
        Self { delay, duration }
    }
}

/// Which header drives polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollingMethod {
    /// Poll an operation resource named by `Azure-AsyncOperation`.
    AsyncOperation,
    /// Poll the resource itself via `Location` or the original URL.
    Location,
}

#[derive(Deserialize)]
struct OperationResource {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ProvisioningStateProperties {
    #[serde(default, rename = "provisioningState")]
    provisioning_state: String,
}

#[derive(Deserialize)]
struct ProvisioningStatus {
    #[serde(default)]
    properties: Option<ProvisioningStateProperties>,
}

/// Projection of one polling response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingState {
    pub method: PollingMethod,
    pub state: String,
    pub uri: Option<Url>,
    pub status: u16,
    pub code: String,
    pub message: String,
}

fn header_url(response: &HttpResponse, name: &str) -> AzureResult<Option<Url>> {
    match response.header(name).map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => Url::parse(value).map(Some).map_err(|_| {
            ProtocolError::InvalidHeader {
                header: name.to_string(),
                value: value.to_string(),
            }
            .into()
        }),
        None => Ok(None),
    }
}

fn is_terminal_state(state: &str) -> bool {
    [OPERATION_SUCCEEDED, OPERATION_FAILED, OPERATION_CANCELED]
        .iter()
        .any(|t| t.eq_ignore_ascii_case(state))
}

impl PollingState {
    /// Initial state from the response to `request`.
    pub fn new(request: &HttpRequest, response: &HttpResponse) -> AzureResult<Self> {
        let uri = match matches!(
            request.method,
            HttpMethod::Put | HttpMethod::Patch | HttpMethod::Get
        ) {
            true => Some(request.url.clone()),
            false => None,
        };
        let mut state = Self {
            method: PollingMethod::Location,
            state: String::new(),
            uri,
            status: response.status,
            code: String::new(),
            message: String::new(),
        };
        state.update(response)?;
        Ok(state)
    }

    /// Fold `response` into the state.
    pub fn update(&mut self, response: &HttpResponse) -> AzureResult<()> {
        if let Some(uri) = header_url(response, HEADER_ASYNC_OPERATION)? {
            self.method = PollingMethod::AsyncOperation;
            self.uri = Some(uri);
        } else if let Some(uri) = header_url(response, HEADER_LOCATION)? {
            self.uri = Some(uri);
        }

        self.status = response.status;
        self.state = self.project(response)?;
        if self.state.is_empty() {
            self.state = match response.status {
                202 => OPERATION_IN_PROGRESS,
                200 | 201 | 204 => OPERATION_SUCCEEDED,
                _ => OPERATION_FAILED,
            }
            .to_string();
        }

        if self.has_failed() {
            let error = ServiceError::from_body(&response.body).unwrap_or_default();
            self.code = error.code;
            self.message = match error.message.is_empty() {
                true => response.text(),
                false => error.message,
            };
        }
        Ok(())
    }

    fn project(&self, response: &HttpResponse) -> AzureResult<String> {
        let body = response.body.as_ref();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(String::new());
        }
        match self.method {
            PollingMethod::AsyncOperation if response.is_success() => {
                let operation: OperationResource =
                    serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidJson {
                        message: format!("failed to decode operation resource: {}", e),
                    })?;
                Ok(operation.status)
            }
            _ => Ok(serde_json::from_slice::<ProvisioningStatus>(body)
                .ok()
                .and_then(|s| s.properties)
                .map(|p| p.provisioning_state)
                .unwrap_or_default()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal_state(&self.state)
    }

    pub fn has_succeeded(&self) -> bool {
        self.state.eq_ignore_ascii_case(OPERATION_SUCCEEDED)
    }

    pub fn has_failed(&self) -> bool {
        self.is_terminal() && !self.has_succeeded()
    }

    fn failure(&self) -> AzureError {
        PollingError::OperationFailed {
            state: self.state.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
            status: self.status,
        }
        .into()
    }
}

/// Poll until the operation started by `request` (answered with `response`)
/// is terminal. Returns the final response on success.
pub async fn poll_for_completion<S>(
    sender: &S,
    request: &HttpRequest,
    response: HttpResponse,
    config: &PollingConfig,
) -> AzureResult<HttpResponse>
where
    S: Sender + ?Sized,
{
    let mut request = request.clone();
    let cancel = request.ensure_cancel();
    let started = Instant::now();
    let mut state = PollingState::new(&request, &response)?;
    let mut response = response;

    loop {
        if state.is_terminal() {
            if state.has_succeeded() {
                info!(status = response.status, "Long running operation succeeded");
                return Ok(response);
            }
            return Err(state.failure());
        }

        let uri = state
            .uri
            .clone()
            .ok_or(PollingError::MissingPollingUri {
                status: response.status,
            })?;

        let delay = get_retry_after(&response)
            .map(|retry_after| retry_after.max(config.delay))
            .unwrap_or(config.delay);
        if let Some(budget) = config.duration {
            if started.elapsed() + delay > budget {
                return Err(PollingError::DurationExceeded { duration: budget }.into());
            }
        }

        debug!(
            uri = %uri,
            state = %state.state,
            delay_ms = delay.as_millis() as u64,
            "Polling long running operation"
        );
        if !sleep_with_cancel(delay, &cancel).await {
            return Err(AzureError::cancelled("polling long running operation"));
        }

        let poll = HttpRequest::new(HttpMethod::Get, uri).with_cancel(cancel.clone());
        response = sender.send(poll).await?;
        state.update(&response)?;
    }
}

/// Check whether `response` starts a long-running operation.
pub fn response_has_started_operation(response: &HttpResponse) -> bool {
    matches!(response.status, 201 | 202)
}

struct PollingSender {
    inner: Arc<dyn Sender>,
    config: PollingConfig,
}

#[async_trait]
impl Sender for PollingSender {
    async fn send(&self, mut request: HttpRequest) -> AzureResult<HttpResponse> {
        request.ensure_cancel();
        let original = request.without_body();

        let response = self.inner.send(request).await?;
        if !response_has_started_operation(&response) {
            return Ok(response);
        }
        poll_for_completion(self.inner.as_ref(), &original, response, &self.config).await
    }
}

/// Send, then poll to completion when the response is `201` or `202`.
pub fn with_polling(config: PollingConfig) -> SendDecorator {
    Box::new(move |inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(PollingSender { inner, config })
    })
}
