//! Logging
//!
//! Subscriber installation and request/response inspectors.

use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{
    prepare_fn, HttpRequest, HttpResponse, PrepareDecorator, HEADER_AUTHORIZATION,
    HEADER_AUXILIARY_AUTHORIZATION, HEADER_CLIENT_REQUEST_ID,
};
use crate::error::{AzureResult, ConfigurationError};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Output format of the installed formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Formatter.
    pub format: LogFormat,
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: LogLevel,
    /// Explicit filter directives, e.g. `azure_rest=debug`. Overrides `RUST_LOG`.
    pub filter: Option<String>,
}

impl LoggingConfig {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Resolve the filter: explicit directives, then `RUST_LOG`, then `level`.
    pub fn env_filter(&self) -> AzureResult<EnvFilter> {
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).map_err(|e| {
                ConfigurationError::invalid("filter", e.to_string()).into()
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))),
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> AzureResult<()> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };
    result.map_err(|e| ConfigurationError::invalid("logging", e.to_string()).into())
}

const REDACTED_HEADERS: &[&str] = &[HEADER_AUTHORIZATION, HEADER_AUXILIARY_AUTHORIZATION];

/// Header names and values with credentials masked, sorted by name.
pub fn redacted_headers(request: &HttpRequest) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| match REDACTED_HEADERS.contains(&name.as_str()) {
            true => (name.clone(), "REDACTED".to_string()),
            false => (name.clone(), value.clone()),
        })
        .collect();
    headers.sort();
    headers
}

/// Log an outgoing request.
pub fn log_request(request: &HttpRequest) {
    info!(
        method = %request.method,
        url = %request.url,
        client_request_id = request.header(HEADER_CLIENT_REQUEST_ID).unwrap_or(""),
        "Sending request"
    );
    debug!(headers = ?redacted_headers(request), "Request headers");
}

/// Log a received response.
pub fn log_response(response: &HttpResponse) {
    info!(
        status = response.status,
        request_id = response.request_id().unwrap_or(""),
        "Received response"
    );
}

/// Prepare decorator that logs the request as it leaves the pipeline.
pub fn request_logging_inspector() -> Arc<dyn PrepareDecorator> {
    prepare_fn(|request: HttpRequest| {
        log_request(&request);
        Ok(request)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HttpMethod;

    #[test]
    fn test_explicit_filter() {
        let config = LoggingConfig::new(LogFormat::Json).with_filter("azure_rest=debug");
        assert!(config.env_filter().unwrap().to_string().contains("azure_rest"));

        let bad = LoggingConfig::default().with_filter("azure_rest=notalevel");
        assert!(bad.env_filter().is_err());
    }

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::default().to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert!(LogLevel::Debug < LogLevel::Error);
    }

    #[test]
    fn test_redacts_credentials() {
        let request = HttpRequest::parse(HttpMethod::Get, "https://svc.example/")
            .unwrap()
            .with_header("Authorization", "Bearer secret")
            .with_header("x-ms-authorization-auxiliary", "Bearer aux")
            .with_header("User-Agent", "agent");

        assert_eq!(
            redacted_headers(&request),
            vec![
                ("authorization".to_string(), "REDACTED".to_string()),
                ("user-agent".to_string(), "agent".to_string()),
                ("x-ms-authorization-auxiliary".to_string(), "REDACTED".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_inspector_leaves_request_unchanged() {
        let request = HttpRequest::parse(HttpMethod::Put, "https://svc.example/r")
            .unwrap()
            .with_header("x-ms-client-request-id", "abc");
        let inspected = request_logging_inspector().prepare(request).await.unwrap();
        assert_eq!(inspected.header("x-ms-client-request-id"), Some("abc"));
        assert_eq!(inspected.method, HttpMethod::Put);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::new(LogFormat::Compact).with_filter("warn");
        let first = init_logging(&config);
        let second = init_logging(&config);
        assert!(first.is_err() || second.is_err());
    }
}
