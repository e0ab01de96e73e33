//! Telemetry
//!
//! Structured logging through `tracing`: subscriber setup and request and
//! response inspectors.

pub mod logging;

pub use logging::{
    init_logging, log_request, log_response, redacted_headers, request_logging_inspector,
    LogFormat, LogLevel, LoggingConfig,
};
