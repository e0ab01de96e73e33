//! Resilience
//!
//! Retry with exponential backoff and server-directed delays, shared by the
//! request pipeline and token refresh.

pub mod retry;

pub use retry::{
    delay_for_backoff, delay_with_retry_after, get_retry_after, send_with_retry,
    sleep_with_cancel, RetryPolicy, AZURE_STATUS_CODES_FOR_RETRY, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF, IMDS_STATUS_CODES_FOR_RETRY, STATUS_CODES_FOR_RETRY,
};
