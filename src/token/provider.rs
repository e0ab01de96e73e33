//! Token Providers
//!
//! Seams between token holders and the authorizers that consume them.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AzureResult;

/// Source of an OAuth access token.
#[async_trait]
pub trait OAuthTokenProvider: Send + Sync {
    /// Current access token.
    async fn oauth_token(&self) -> String;

    /// Value for the `Authorization` header of a request to `host`.
    async fn authorization_value(&self, host: &str) -> AzureResult<String> {
        let _ = host;
        Ok(format!("Bearer {}", self.oauth_token().await))
    }

    /// Refresh capability, when the provider has one.
    fn refresher(&self) -> Option<&dyn Refresher> {
        None
    }
}

/// Token holder that can renew itself.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Refresh if the token expires within the refresh window.
    async fn ensure_fresh(&self, cancel: &CancellationToken) -> AzureResult<()>;

    /// Unconditionally refresh.
    async fn refresh(&self, cancel: &CancellationToken) -> AzureResult<()>;

    /// Refresh for `resource` and switch the holder to it.
    async fn refresh_exchange(&self, resource: &str, cancel: &CancellationToken) -> AzureResult<()>;
}
