//! Error Types
//!
//! Error hierarchy shared by the credential pipeline and the request lifecycle.

pub mod service;

use std::time::Duration;
use thiserror::Error;

use crate::core::HttpResponse;

pub use service::{BearerChallenge, RequestError, ServiceError, ServiceErrorDetail};

/// Root error type.
#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Service error: {0}")]
    Service(#[from] RequestError),

    #[error("Polling error: {0}")]
    Polling(#[from] PollingError),

    #[error("Operation cancelled while {operation}")]
    Cancelled { operation: String },

    #[error("Device flow error: {0}")]
    DeviceFlow(#[from] DeviceFlowError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed auto registering resource provider: {source}")]
    Registration {
        #[source]
        source: Box<AzureError>,
    },
}

impl AzureError {
    /// Build a cancellation error for the named wait.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Wrap an error raised while registering a resource provider.
    pub fn registration(source: AzureError) -> Self {
        Self::Registration {
            source: Box::new(source),
        }
    }

    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "AZURE_CONFIG",
            Self::Transport(_) => "AZURE_TRANSPORT",
            Self::Authentication(_) => "AZURE_AUTH",
            Self::Service(_) => "AZURE_SERVICE",
            Self::Polling(_) => "AZURE_POLLING",
            Self::Cancelled { .. } => "AZURE_CANCELLED",
            Self::DeviceFlow(_) => "AZURE_DEVICE",
            Self::Protocol(_) => "AZURE_PROTOCOL",
            Self::Registration { .. } => "AZURE_REGISTRATION",
        }
    }

    /// Check if the error may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::DeviceFlow(DeviceFlowError::AuthorizationPending) => true,
            Self::DeviceFlow(DeviceFlowError::SlowDown) => true,
            Self::Service(e) => matches!(e.status_code, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// HTTP status of the response behind this error, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication(e) => e.response.as_ref().map(|r| r.status),
            Self::Service(e) => Some(e.status_code),
            Self::Polling(PollingError::OperationFailed { status, .. }) => Some(*status),
            Self::Registration { source } => source.status_code(),
            _ => None,
        }
    }

    /// Raw response attached to the error, if any.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Self::Authentication(e) => e.response.as_ref(),
            Self::Registration { source } => source.response(),
            _ => None,
        }
    }

    /// Check if the error was caused by a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Registration { source } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Invalid input to a constructor or builder.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Parameter '{name}' cannot be empty")]
    EmptyParameter { name: String },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unknown environment: {name}")]
    UnknownEnvironment { name: String },

    #[error("Failed to read '{path}': {message}")]
    FileRead { path: String, message: String },

    #[error("{package}#{method}: Invalid input: field '{target}' violated constraint '{constraint}': {message}")]
    Validation {
        package: String,
        method: String,
        target: String,
        constraint: String,
        message: String,
    },
}

impl ConfigurationError {
    /// Shorthand for an empty required parameter.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::EmptyParameter { name: name.into() }
    }

    /// Shorthand for an invalid parameter.
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// The request could not be sent or the response could not be read.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Failed to read body: {message}")]
    BodyRead { message: String },

    #[error("Failed to build request: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRequest { .. })
    }
}

/// The token endpoint rejected a request, or a refresh could not complete.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AuthenticationError {
    /// Human readable description.
    pub message: String,
    /// Raw token endpoint response, when one was received.
    pub response: Option<HttpResponse>,
}

impl AuthenticationError {
    /// Create an error without a response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Create an error carrying the token endpoint response.
    pub fn with_response(message: impl Into<String>, response: HttpResponse) -> Self {
        Self {
            message: message.into(),
            response: Some(response),
        }
    }
}

/// Long-running operation failures.
#[derive(Error, Debug)]
pub enum PollingError {
    #[error("Long running operation terminated with status '{state}': Code=\"{code}\" Message=\"{message}\"")]
    OperationFailed {
        state: String,
        code: String,
        message: String,
        status: u16,
    },

    #[error("No URI to poll after response with status {status}")]
    MissingPollingUri { status: u16 },

    #[error("Polling exceeded the polling duration of {duration:?}")]
    DurationExceeded { duration: Duration },
}

/// Device flow error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowError {
    #[error("Authorization pending - user has not yet completed authorization")]
    AuthorizationPending,

    #[error("Slow down - the server asked to poll less often")]
    SlowDown,

    #[error("Access denied by user")]
    AccessDenied,

    #[error("Device code expired")]
    CodeExpired,

    #[error("Device flow failed: {error}")]
    Generic {
        error: String,
        error_description: Option<String>,
    },
}

/// Response could not be interpreted.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid value for header '{header}': {value}")]
    InvalidHeader { header: String, value: String },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for AzureError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.into())
    }
}

/// Result type for runtime operations.
pub type AzureResult<T> = Result<T, AzureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(AzureError::from(TransportError::Timeout {
            timeout: Duration::from_secs(30)
        })
        .is_retryable());
        assert!(AzureError::DeviceFlow(DeviceFlowError::AuthorizationPending).is_retryable());
        assert!(!AzureError::DeviceFlow(DeviceFlowError::AccessDenied).is_retryable());
        assert!(!AzureError::cancelled("waiting").is_retryable());
    }

    #[test]
    fn test_authentication_error_keeps_response() {
        let response = HttpResponse::new(401).with_body("denied");
        let error: AzureError =
            AuthenticationError::with_response("refresh failed", response).into();
        assert_eq!(error.status_code(), Some(401));
        assert_eq!(error.response().map(|r| r.text()), Some("denied".to_string()));
        assert_eq!(error.error_code(), "AZURE_AUTH");
    }

    #[test]
    fn test_registration_wraps_cancellation() {
        let error = AzureError::registration(AzureError::cancelled("polling registration"));
        assert!(error.is_cancelled());
        assert!(error.to_string().contains("polling registration"));
    }

    #[test]
    fn test_polling_error_message_contains_code() {
        let error = PollingError::OperationFailed {
            state: "Failed".to_string(),
            code: "BadArgument".to_string(),
            message: "bad".to_string(),
            status: 200,
        };
        assert!(error.to_string().contains("BadArgument"));
    }
}
