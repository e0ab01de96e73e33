//! Configuration Types
//!
//! Client configuration and OAuth grant types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::retry::{RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF};

/// Default delay between LRO polls when the service sends no `Retry-After`.
pub const DEFAULT_POLLING_DELAY: Duration = Duration::from_secs(60);

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default refresh lead window.
pub const DEFAULT_REFRESH_WITHIN: Duration = Duration::from_secs(300);

/// Default user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("azure-rest-integration/", env!("CARGO_PKG_VERSION"));

/// Client configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Attempts per request.
    pub retry_attempts: u32,
    /// Base of the exponential backoff.
    pub retry_backoff: Duration,
    /// Cap on a single backoff sleep.
    pub max_backoff: Option<Duration>,
    /// Delay between LRO polls.
    pub polling_delay: Duration,
    /// Overall LRO and registration polling budget. `None` polls until terminal.
    pub polling_duration: Option<Duration>,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Skip resource-provider auto-registration.
    pub skip_resource_provider_registration: bool,
    /// Transport timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_backoff: None,
            polling_delay: DEFAULT_POLLING_DELAY,
            polling_duration: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            skip_resource_provider_registration: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Retry policy for resource manager requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::azure(self.retry_attempts, self.retry_backoff);
        match self.max_backoff {
            Some(cap) => policy.with_max_backoff(cap),
            None => policy,
        }
    }
}

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
    Password,
    AuthorizationCode,
    RefreshToken,
    DeviceCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "device_code",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.polling_delay, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("azure-rest-integration/"));
        let policy = config.retry_policy();
        assert!(policy.should_retry_status(409));
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(GrantType::DeviceCode.as_str(), "device_code");
        assert_eq!(
            serde_json::to_string(&GrantType::ClientCredentials).unwrap(),
            "\"client_credentials\""
        );
    }
}
