//! Configuration Builder
//!
//! Fluent builder for client configuration.

use std::time::Duration;

use crate::error::{AzureResult, ConfigurationError};
use crate::types::config::ClientConfig;

/// Client configuration builder.
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
    user_agent_suffixes: Vec<String>,
}

impl ClientConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set retry attempts.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Set backoff base.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Cap a single backoff sleep.
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.config.max_backoff = Some(max_backoff);
        self
    }

    /// Set LRO polling delay.
    pub fn polling_delay(mut self, delay: Duration) -> Self {
        self.config.polling_delay = delay;
        self
    }

    /// Bound total polling time.
    pub fn polling_duration(mut self, duration: Duration) -> Self {
        self.config.polling_duration = Some(duration);
        self
    }

    /// Replace the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Append a product token to the user agent.
    pub fn add_user_agent(mut self, extension: impl Into<String>) -> Self {
        self.user_agent_suffixes.push(extension.into());
        self
    }

    pub fn skip_resource_provider_registration(mut self, skip: bool) -> Self {
        self.config.skip_resource_provider_registration = skip;
        self
    }

    /// Set transport timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AzureResult<ClientConfig> {
        let mut config = self.config;

        if config.retry_attempts == 0 {
            return Err(ConfigurationError::invalid("retry_attempts", "must be at least 1").into());
        }
        if config.timeout.is_zero() {
            return Err(ConfigurationError::invalid("timeout", "must be greater than zero").into());
        }
        if let Some(cap) = config.max_backoff {
            if cap < config.retry_backoff {
                return Err(ConfigurationError::invalid(
                    "max_backoff",
                    "must not be smaller than retry_backoff",
                )
                .into());
            }
        }
        if config.user_agent.trim().is_empty() {
            return Err(ConfigurationError::empty("user_agent").into());
        }
        for suffix in self.user_agent_suffixes {
            if !suffix.trim().is_empty() {
                config.user_agent = format!("{} {}", config.user_agent, suffix.trim());
            }
        }

        Ok(config)
    }
}

/// Create a new client configuration builder.
pub fn client_config() -> ClientConfigBuilder {
    ClientConfigBuilder::new()
}
