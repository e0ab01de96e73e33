//! Retry Logic
//!
//! Exponential backoff retry with server-directed `Retry-After` delays.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{HttpRequest, HttpResponse, RetriableRequest, Sender, HEADER_RETRY_AFTER};
use crate::error::{AzureError, AzureResult};

/// Default number of attempts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default backoff base.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Statuses retried by default.
pub const STATUS_CODES_FOR_RETRY: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Statuses retried against resource manager. 409 lets provider registration kick in.
pub const AZURE_STATUS_CODES_FOR_RETRY: &[u16] = &[408, 409, 429, 500, 502, 503, 504];

/// Statuses retried against the managed identity endpoint.
pub const IMDS_STATUS_CODES_FOR_RETRY: &[u16] = &[
    404, 408, 410, 429, 500, 501, 502, 503, 504, 505, 506, 507, 508, 510, 511,
];

/// Retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (429 with `Retry-After` does not count).
    pub attempts: u32,
    /// Base of the exponential backoff.
    pub backoff: Duration,
    /// Cap on a single backoff sleep.
    pub max_backoff: Option<Duration>,
    /// Statuses that trigger another attempt.
    pub status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
            max_backoff: None,
            status_codes: STATUS_CODES_FOR_RETRY.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default status set.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts,
            backoff,
            ..Default::default()
        }
    }

    /// Policy for resource manager requests.
    pub fn azure(attempts: u32, backoff: Duration) -> Self {
        Self::new(attempts, backoff).with_status_codes(AZURE_STATUS_CODES_FOR_RETRY)
    }

    /// Policy for managed identity token requests.
    pub fn imds(attempts: u32, backoff: Duration) -> Self {
        Self::new(attempts, backoff).with_status_codes(IMDS_STATUS_CODES_FOR_RETRY)
    }

    /// A policy that sends once.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_status_codes(mut self, codes: &[u16]) -> Self {
        self.status_codes = codes.to_vec();
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Check if a status should be retried.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    /// Sleep before the attempt following `attempt` (zero based): `backoff * 2^attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX);
        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub async fn sleep_with_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Positive integer `Retry-After` seconds, if present.
///
/// `0`, negative, HTTP-date and malformed values are ignored.
pub fn get_retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header(HEADER_RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Sleep for the `Retry-After` of a 429 response.
///
/// Returns `Ok(true)` if it slept, `Ok(false)` when the response does not
/// direct a delay.
pub async fn delay_with_retry_after(
    response: &HttpResponse,
    cancel: &CancellationToken,
) -> AzureResult<bool> {
    if response.status != 429 {
        return Ok(false);
    }
    let Some(delay) = get_retry_after(response) else {
        return Ok(false);
    };
    debug!(delay_secs = delay.as_secs(), "Throttled, honoring Retry-After");
    if !sleep_with_cancel(delay, cancel).await {
        return Err(AzureError::cancelled("waiting for Retry-After"));
    }
    Ok(true)
}

/// Sleep `policy.backoff_for(attempt)` honoring cancellation.
pub async fn delay_for_backoff(
    policy: &RetryPolicy,
    attempt: u32,
    cancel: &CancellationToken,
) -> AzureResult<()> {
    let delay = policy.backoff_for(attempt);
    if !sleep_with_cancel(delay, cancel).await {
        return Err(AzureError::cancelled("waiting to retry"));
    }
    Ok(())
}

fn is_retryable_error(error: &AzureError) -> bool {
    matches!(error, AzureError::Transport(e) if e.is_retryable())
}

/// Send `request`, retrying on the policy's statuses and on transport errors.
///
/// When attempts run out the last response (or transport error) is returned.
pub async fn send_with_retry<S>(
    sender: &S,
    request: HttpRequest,
    policy: &RetryPolicy,
) -> AzureResult<HttpResponse>
where
    S: Sender + ?Sized,
{
    let cancel = request.cancel_token();
    let max_attempts = policy.attempts.max(1);
    let mut retriable = RetriableRequest::new(request);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(AzureError::cancelled("sending request"));
        }

        let result = sender.send(retriable.prepare()?).await;
        let retry = match &result {
            Ok(response) => policy.should_retry_status(response.status),
            Err(error) => is_retryable_error(error),
        };
        if !retry {
            return result;
        }

        if let Ok(response) = &result {
            if delay_with_retry_after(response, &cancel).await? {
                continue;
            }
        }

        attempt += 1;
        if attempt >= max_attempts {
            match &result {
                Ok(response) => warn!(
                    status = response.status,
                    attempts = attempt,
                    "Retry attempts exhausted"
                ),
                Err(error) => warn!(
                    error = %error,
                    attempts = attempt,
                    "Retry attempts exhausted"
                ),
            }
            return result;
        }

        debug!(
            attempt = attempt,
            backoff_ms = policy.backoff_for(attempt - 1).as_millis() as u64,
            status = result.as_ref().map(|r| r.status).ok(),
            "Retrying request"
        );
        delay_for_backoff(policy, attempt - 1, &cancel).await?;
    }
}
