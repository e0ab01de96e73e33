//! Device Code Flow
//!
//! Sign-in on a device without a browser: obtain a user code, then poll the
//! token endpoint while the user completes sign-in elsewhere.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::{as_post, with_form_data, HttpMethod, HttpRequest, HttpResponse, Preparer, Sender};
use crate::error::{AuthenticationError, AzureError, AzureResult, DeviceFlowError, ProtocolError};
use crate::resilience::retry::sleep_with_cancel;
use crate::types::{
    DeviceCode, DeviceCodeResponse, DeviceFlowConfig, DeviceTokenError, GrantType, OAuthConfig,
    Token,
};

/// Device code flow interface.
#[async_trait]
pub trait DeviceAuthorizationFlow: Send + Sync {
    /// Request a device code for `client_id` and `resource`.
    async fn initiate_device_auth(
        &self,
        oauth_config: &OAuthConfig,
        client_id: &str,
        resource: &str,
    ) -> AzureResult<DeviceCode>;

    /// Poll the token endpoint once.
    async fn check_for_user_completion(&self, code: &DeviceCode) -> AzureResult<Token>;

    /// Poll until the user completes sign-in, the code expires or `cancel` fires.
    async fn wait_for_user_completion(
        &self,
        code: &DeviceCode,
        cancel: &CancellationToken,
    ) -> AzureResult<Token>;
}

/// Device code flow over a `Sender`.
pub struct DeviceAuthorizationFlowImpl {
    sender: Arc<dyn Sender>,
    config: DeviceFlowConfig,
}

impl DeviceAuthorizationFlowImpl {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self::with_config(sender, DeviceFlowConfig::default())
    }

    pub fn with_config(sender: Arc<dyn Sender>, config: DeviceFlowConfig) -> Self {
        Self { sender, config }
    }

    async fn post_form(&self, url: &url::Url, fields: Vec<(&str, &str)>) -> AzureResult<HttpResponse> {
        let request = Preparer::new(vec![as_post(), with_form_data(fields)])
            .prepare(HttpRequest::new(HttpMethod::Post, url.clone()))
            .await?;
        self.sender.send(request).await
    }
}

#[async_trait]
impl DeviceAuthorizationFlow for DeviceAuthorizationFlowImpl {
    async fn initiate_device_auth(
        &self,
        oauth_config: &OAuthConfig,
        client_id: &str,
        resource: &str,
    ) -> AzureResult<DeviceCode> {
        let response = self
            .post_form(
                &oauth_config.device_code_endpoint,
                vec![("client_id", client_id), ("resource", resource)],
            )
            .await?;

        if response.status != 200 {
            let message = format!(
                "device code endpoint returned status {}: {}",
                response.status,
                response.text()
            );
            return Err(AuthenticationError::with_response(message, response).into());
        }

        let decoded: DeviceCodeResponse = response.json()?;
        if decoded.device_code.is_empty() {
            return Err(ProtocolError::InvalidResponse {
                message: "device code response has no device_code".to_string(),
            }
            .into());
        }

        info!(
            user_code = %decoded.user_code,
            verification_url = %decoded.verification_url,
            expires_in = decoded.expires_in,
            "Device code issued"
        );
        Ok(DeviceCode::from_response(
            decoded,
            client_id,
            resource,
            oauth_config.clone(),
        ))
    }

    async fn check_for_user_completion(&self, code: &DeviceCode) -> AzureResult<Token> {
        let response = self
            .post_form(
                &code.oauth_config.token_endpoint,
                vec![
                    ("grant_type", GrantType::DeviceCode.as_str()),
                    ("client_id", code.client_id.as_str()),
                    ("code", code.device_code.as_str()),
                    ("resource", code.resource.as_str()),
                ],
            )
            .await?;

        if response.status == 200 {
            let mut token = Token::from_response_body(&response.body, Utc::now())?;
            if token.resource.is_empty() {
                token.resource = code.resource.clone();
            }
            return Ok(token);
        }

        match serde_json::from_slice::<DeviceTokenError>(&response.body) {
            Ok(error) if !error.error.is_empty() => Err(DeviceFlowError::from(error).into()),
            _ => {
                let message = format!(
                    "token endpoint returned status {} while polling device code",
                    response.status
                );
                Err(AuthenticationError::with_response(message, response).into())
            }
        }
    }

    async fn wait_for_user_completion(
        &self,
        code: &DeviceCode,
        cancel: &CancellationToken,
    ) -> AzureResult<Token> {
        let interval = code.polling_interval(self.config.default_interval);
        let max_wait = max_poll_wait(interval, &self.config);
        let deadline = code.lifetime().map(|lifetime| Instant::now() + lifetime);
        let mut wait = interval;

        loop {
            if cancel.is_cancelled() {
                return Err(AzureError::cancelled("waiting for device code sign-in"));
            }

            match self.check_for_user_completion(code).await {
                Ok(token) => {
                    info!("Device code sign-in completed");
                    return Ok(token);
                }
                Err(AzureError::DeviceFlow(DeviceFlowError::AuthorizationPending)) => {}
                Err(AzureError::DeviceFlow(DeviceFlowError::SlowDown)) => {
                    wait *= 2;
                    debug!(wait_secs = wait.as_secs(), "Device code polling slowed down");
                }
                Err(error) => return Err(error),
            }

            if wait > max_wait {
                return Err(DeviceFlowError::SlowDown.into());
            }
            if let Some(deadline) = deadline {
                if Instant::now() + wait > deadline {
                    return Err(DeviceFlowError::CodeExpired.into());
                }
            }
            if !sleep_with_cancel(wait, cancel).await {
                return Err(AzureError::cancelled("waiting for device code sign-in"));
            }
        }
    }
}

/// Create a device code flow with default polling configuration.
pub fn create_device_authorization_flow(sender: Arc<dyn Sender>) -> DeviceAuthorizationFlowImpl {
    DeviceAuthorizationFlowImpl::new(sender)
}

/// Upper bound on a single poll wait for `interval` under `config`.
pub fn max_poll_wait(interval: Duration, config: &DeviceFlowConfig) -> Duration {
    interval * config.max_wait_factor
}
