//! Device Code Types
//!
//! Device-code artifact and polling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DeviceFlowError;
use crate::types::endpoints::OAuthConfig;
use crate::types::serde_helpers::string_or_number;

/// Device-code endpoint response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    /// Device verification code (not shown to user).
    #[serde(default)]
    pub device_code: String,
    /// User code to display.
    #[serde(default)]
    pub user_code: String,
    /// URL for user to visit.
    #[serde(default, alias = "verification_uri")]
    pub verification_url: String,
    /// Lifetime in seconds.
    #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Polling interval in seconds.
    #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Message to show the user.
    #[serde(default)]
    pub message: String,
}

/// Device code plus the context it was issued for. Immutable.
#[derive(Clone, Debug)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: Option<i64>,
    pub interval: Option<i64>,
    pub message: String,
    pub client_id: String,
    pub resource: String,
    pub oauth_config: OAuthConfig,
}

impl DeviceCode {
    pub fn from_response(
        response: DeviceCodeResponse,
        client_id: impl Into<String>,
        resource: impl Into<String>,
        oauth_config: OAuthConfig,
    ) -> Self {
        Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_url: response.verification_url,
            expires_in: response.expires_in,
            interval: response.interval,
            message: response.message,
            client_id: client_id.into(),
            resource: resource.into(),
            oauth_config,
        }
    }

    /// Server-specified interval, or `fallback`.
    pub fn polling_interval(&self, fallback: Duration) -> Duration {
        self.interval
            .filter(|i| *i > 0)
            .map(|i| Duration::from_secs(i as u64))
            .unwrap_or(fallback)
    }

    /// Lifetime of the code, when the server stated one.
    pub fn lifetime(&self) -> Option<Duration> {
        self.expires_in
            .filter(|e| *e > 0)
            .map(|e| Duration::from_secs(e as u64))
    }
}

/// Error body returned while polling the token endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceTokenError {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<DeviceTokenError> for DeviceFlowError {
    fn from(e: DeviceTokenError) -> Self {
        match e.error.as_str() {
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" | "authorization_declined" => Self::AccessDenied,
            "code_expired" | "expired_token" => Self::CodeExpired,
            _ => Self::Generic {
                error: e.error,
                error_description: e.error_description,
            },
        }
    }
}

/// Polling configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceFlowConfig {
    /// Interval used when the server gives none.
    pub default_interval: Duration,
    /// Give up once the wait grows beyond `max_wait_factor * interval`.
    pub max_wait_factor: u32,
}

/// Default poll interval.
pub const DEFAULT_DEVICE_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait cap multiplier.
pub const DEFAULT_DEVICE_MAX_WAIT_FACTOR: u32 = 3;

impl Default for DeviceFlowConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_DEVICE_INTERVAL,
            max_wait_factor: DEFAULT_DEVICE_MAX_WAIT_FACTOR,
        }
    }
}
