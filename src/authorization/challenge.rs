//! Bearer Challenge
//!
//! Re-authorizes a request once when the service rejects it with a
//! `WWW-Authenticate: Bearer ...` challenge naming the tenant and resource
//! it expects.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::info;

use crate::authorization::Authorizer;
use crate::core::{HttpRequest, HttpResponse, RetriableRequest, SendDecorator, Sender};
use crate::error::{AzureResult, BearerChallenge};

/// Produces an authorizer for `(tenant_id, resource)` taken from a challenge.
pub type ChallengeCallback =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, AzureResult<Arc<dyn Authorizer>>> + Send + Sync>;

struct ChallengeSender {
    inner: Arc<dyn Sender>,
    callback: ChallengeCallback,
}

#[async_trait]
impl Sender for ChallengeSender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let mut retriable = RetriableRequest::new(request);
        let response = self.inner.send(retriable.prepare()?).await?;

        if !BearerChallenge::is_challenge(&response) {
            return Ok(response);
        }
        let Some(challenge) = BearerChallenge::from_response(&response) else {
            return Ok(response);
        };
        let tenant_id = challenge.tenant_id().unwrap_or_default().to_string();
        let resource = challenge.resource().unwrap_or_default().to_string();
        info!(
            tenant_id = %tenant_id,
            resource = %resource,
            "Bearer challenge received, re-authorizing"
        );

        let authorizer = (self.callback)(tenant_id, resource).await?;
        let request = authorizer
            .with_authorization()
            .prepare(retriable.prepare()?)
            .await?;
        self.inner.send(request).await
    }
}

/// On a `401` bearer challenge, ask `callback` for an authorizer, re-prepare
/// the request with it and send it once more.
pub fn with_bearer_challenge(callback: ChallengeCallback) -> SendDecorator {
    Box::new(move |inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(ChallengeSender { inner, callback })
    })
}
