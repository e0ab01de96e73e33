//! Service Errors
//!
//! Structured errors returned by the target service and bearer challenges
//! lifted from `WWW-Authenticate`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::core::{HttpResponse, HEADER_REQUEST_ID, HEADER_WWW_AUTHENTICATE};
use crate::types::serde_helpers::null_as_default;

/// Error object returned in the `error` field of a failed response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    /// Service-defined error code.
    #[serde(default)]
    pub code: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Target of the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Nested details.
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Vec<ServiceErrorDetail>,
    /// Opaque inner error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<serde_json::Value>,
    /// Opaque additional info entries.
    #[serde(default, deserialize_with = "null_as_default")]
    pub additional_info: Vec<serde_json::Value>,
}

/// One entry of `error.details`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ServiceErrorEnvelope {
    #[serde(default)]
    error: Option<ServiceError>,
}

impl ServiceError {
    /// Decode from a response body.
    ///
    /// Accepts the `{"error": {...}}` envelope and, failing that, a bare
    /// `{"code": ..., "message": ...}` object.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        if let Ok(ServiceErrorEnvelope { error: Some(error) }) = serde_json::from_slice(body) {
            return Some(error);
        }
        serde_json::from_slice::<ServiceError>(body)
            .ok()
            .filter(|e| !e.code.is_empty())
    }

    /// Target of the first detail entry.
    pub fn first_detail_target(&self) -> Option<&str> {
        self.details.first().and_then(|d| d.target.as_deref())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code=\"{}\" Message=\"{}\"", self.code, self.message)?;
        if let Some(target) = &self.target {
            write!(f, " Target=\"{}\"", target)?;
        }
        if !self.details.is_empty() {
            let details = serde_json::to_string(&self.details).unwrap_or_default();
            write!(f, " Details={}", details)?;
        }
        Ok(())
    }
}

/// Non-success response from the target service.
#[derive(Clone, Debug)]
pub struct RequestError {
    /// HTTP status code.
    pub status_code: u16,
    /// Service-assigned request id (`x-ms-request-id`).
    pub request_id: Option<String>,
    /// Decoded error object, when the body carried one.
    pub service_error: Option<ServiceError>,
    /// Raw body.
    pub body: String,
}

impl RequestError {
    /// Build from a response, decoding the service error when possible.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status_code: response.status,
            request_id: response.header(HEADER_REQUEST_ID).map(str::to_string),
            service_error: ServiceError::from_body(&response.body),
            body: response.text(),
        }
    }

    /// Service error code, if decoded.
    pub fn code(&self) -> Option<&str> {
        self.service_error.as_ref().map(|e| e.code.as_str())
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode={}", self.status_code)?;
        match &self.service_error {
            Some(error) => write!(f, " {}", error)?,
            None if !self.body.is_empty() => write!(f, " Body=\"{}\"", self.body)?,
            None => {}
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " RequestID=\"{}\"", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RequestError {}

/// Parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    values: HashMap<String, String>,
}

const CHALLENGE_TENANT_ID: &str = "tenantID";
const CHALLENGE_RESOURCE: &str = "resource";

impl BearerChallenge {
    /// Check whether a response is a 401 carrying a bearer challenge.
    pub fn is_challenge(response: &HttpResponse) -> bool {
        response.status == 401
            && response
                .header(HEADER_WWW_AUTHENTICATE)
                .map(|h| h.contains("Bearer"))
                .unwrap_or(false)
    }

    /// Parse the challenge from a response header.
    pub fn from_response(response: &HttpResponse) -> Option<Self> {
        response
            .header(HEADER_WWW_AUTHENTICATE)
            .and_then(Self::parse)
    }

    /// Parse `Bearer key="value", key2=value2`.
    ///
    /// `authorization` and `authorization_uri` are folded into the tenant id
    /// (first path segment of the URL).
    pub fn parse(header: &str) -> Option<Self> {
        let trimmed = header.trim();
        let rest = trimmed.strip_prefix("Bearer")?;
        let mut values = HashMap::new();
        for pair in rest.split(',') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let key = key.trim().trim_matches('"');
            let value = value.trim().trim_matches('"');
            match key {
                "authorization" | "authorization_uri" => {
                    if let Some(tenant) = Url::parse(value)
                        .ok()
                        .and_then(|u| u.path_segments()?.next().map(str::to_string))
                        .filter(|t| !t.is_empty())
                    {
                        values.insert(CHALLENGE_TENANT_ID.to_string(), tenant);
                    }
                }
                _ => {
                    values.insert(key.to_string(), value.to_string());
                }
            }
        }
        Some(Self { values })
    }

    /// Tenant id derived from the authorization URI.
    pub fn tenant_id(&self) -> Option<&str> {
        self.values.get(CHALLENGE_TENANT_ID).map(String::as_str)
    }

    /// Requested resource.
    pub fn resource(&self) -> Option<&str> {
        self.values.get(CHALLENGE_RESOURCE).map(String::as_str)
    }

    /// Raw value for a challenge parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
