//! Builders
//!
//! Fluent builder for client configuration.

pub mod config;

pub use config::{client_config, ClientConfigBuilder};
