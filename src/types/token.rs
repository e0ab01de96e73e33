//! Token Types
//!
//! Access token model as returned by the token endpoint.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AzureResult, ProtocolError};
use crate::token::pop::PopKey;
use crate::types::serde_helpers::string_or_number;

/// Token type for bearer tokens.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Token type for proof-of-possession tokens.
pub const TOKEN_TYPE_POP: &str = "pop";

/// OAuth token.
///
/// `expires_on` is absolute epoch seconds. Decoding a response that only
/// carries `expires_in` fills `expires_on` from the time of receipt, so both
/// wire forms give the same instant.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,
    #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub token_type: String,
    /// Key used to sign PoP tokens. Never serialized.
    #[serde(skip)]
    pub pop_key: Option<Arc<dyn PopKey>>,
}

impl Token {
    /// Manual bearer token expiring at `expires_on` (epoch seconds).
    pub fn new(access_token: impl Into<String>, expires_on: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_on: Some(expires_on),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            ..Default::default()
        }
    }

    /// Decode a token endpoint response received at `received_at`.
    pub fn from_response_body(body: &[u8], received_at: DateTime<Utc>) -> AzureResult<Self> {
        let mut token: Token = serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidJson {
            message: format!("failed to decode token response: {}", e),
        })?;
        if token.access_token.is_empty() {
            return Err(ProtocolError::InvalidResponse {
                message: "token response has no access_token".to_string(),
            }
            .into());
        }
        if token.expires_on.is_none() {
            if let Some(expires_in) = token.expires_in {
                let expires_on = received_at.timestamp().checked_add(expires_in).ok_or_else(|| {
                    ProtocolError::InvalidResponse {
                        message: format!("token expires_in out of range: {}", expires_in),
                    }
                })?;
                token.expires_on = Some(expires_on);
            }
        }
        Ok(token)
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Expiration instant. A token with no known expiry is treated as expired.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires_on
            .and_then(|s| Utc.timestamp_opt(s, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Check whether the token expires within `within`.
    pub fn will_expire_in(&self, within: Duration) -> bool {
        let Ok(within) = chrono::Duration::from_std(within) else {
            return true;
        };
        match Utc::now().checked_add_signed(within) {
            Some(deadline) => deadline >= self.expires(),
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.will_expire_in(Duration::ZERO)
    }

    /// Check whether this is the empty token.
    pub fn is_zero(&self) -> bool {
        *self == Token::default()
    }

    pub fn is_pop(&self) -> bool {
        self.token_type.eq_ignore_ascii_case(TOKEN_TYPE_POP)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
            && self.expires_in == other.expires_in
            && self.expires_on == other.expires_on
            && self.not_before == other.not_before
            && self.resource == other.resource
            && self.token_type == other.token_type
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_on", &self.expires_on)
            .field("resource", &self.resource)
            .field("token_type", &self.token_type)
            .field("pop_key", &self.pop_key.is_some())
            .finish()
    }
}
