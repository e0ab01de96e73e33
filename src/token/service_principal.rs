//! Service Principal Token
//!
//! Holds one OAuth token for a client identity and keeps it fresh.
//!
//! Many concurrent requests share a holder through an `Arc`. A read lock
//! serves the fast path; a stale token is renewed under the write lock after
//! re-checking staleness, so at most one refresh is in flight per holder.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{
    as_post, with_form_data, HttpMethod, HttpRequest, HttpResponse, Preparer, ReqwestSender,
    Sender,
};
use crate::error::{AuthenticationError, AzureError, AzureResult, ConfigurationError};
use crate::resilience::retry::{send_with_retry, RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF};
use crate::token::msi::{build_msi_request, is_imds_endpoint, MSI_ENDPOINT};
use crate::token::pop::{pop_token, PopKey, POP_AUTHORIZATION_SCHEME};
use crate::token::provider::{OAuthTokenProvider, Refresher};
use crate::token::secret::ServicePrincipalSecret;
#[cfg(feature = "jwt")]
use crate::token::secret::CertificateSecret;
use crate::types::config::{GrantType, DEFAULT_REFRESH_WITHIN};
use crate::types::endpoints::{MultiTenantOAuthConfig, OAuthConfig};
use crate::types::token::{Token, TOKEN_TYPE_POP};

/// Invoked after every successful refresh, in registration order.
pub type RefreshCallback = Arc<dyn Fn(&Token) -> AzureResult<()> + Send + Sync>;

struct TokenState {
    token: Token,
    resource: String,
}

/// OAuth token for a service principal, user or managed identity.
pub struct ServicePrincipalToken {
    state: RwLock<TokenState>,
    oauth_config: OAuthConfig,
    client_id: String,
    secret: ServicePrincipalSecret,
    auto_refresh: bool,
    refresh_within: Duration,
    sender: Arc<dyn Sender>,
    retry_policy: RetryPolicy,
    callbacks: Vec<RefreshCallback>,
    pop_key: Option<Arc<dyn PopKey>>,
}

fn require(name: &str, value: &str) -> AzureResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::empty(name).into());
    }
    Ok(())
}

impl ServicePrincipalToken {
    /// Create a holder for `client_id` using `secret`.
    pub fn new(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        resource: impl Into<String>,
        secret: ServicePrincipalSecret,
    ) -> AzureResult<Self> {
        let client_id = client_id.into();
        let resource = resource.into();
        require("client_id", &client_id)?;
        require("resource", &resource)?;

        Ok(Self {
            state: RwLock::new(TokenState {
                token: Token::default(),
                resource,
            }),
            oauth_config,
            client_id,
            secret,
            auto_refresh: true,
            refresh_within: DEFAULT_REFRESH_WITHIN,
            sender: Arc::new(ReqwestSender::new()?),
            retry_policy: RetryPolicy::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF),
            callbacks: Vec::new(),
            pop_key: None,
        })
    }

    /// Client-credentials grant with a shared secret.
    pub fn from_secret(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        resource: impl Into<String>,
    ) -> AzureResult<Self> {
        let secret = secret.into();
        require("secret", &secret)?;
        Self::new(
            oauth_config,
            client_id,
            resource,
            ServicePrincipalSecret::client_secret(secret),
        )
    }

    /// Client-credentials grant with a certificate-signed assertion.
    #[cfg(feature = "jwt")]
    pub fn from_certificate(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        certificate: CertificateSecret,
        resource: impl Into<String>,
    ) -> AzureResult<Self> {
        Self::new(
            oauth_config,
            client_id,
            resource,
            ServicePrincipalSecret::Certificate(certificate),
        )
    }

    /// Resource-owner password grant.
    pub fn from_username_password(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        resource: impl Into<String>,
    ) -> AzureResult<Self> {
        let username = username.into();
        let password = password.into();
        require("username", &username)?;
        require("password", &password)?;
        Self::new(
            oauth_config,
            client_id,
            resource,
            ServicePrincipalSecret::username_password(username, password),
        )
    }

    /// Authorization-code grant.
    pub fn from_authorization_code(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
        resource: impl Into<String>,
    ) -> AzureResult<Self> {
        let client_secret = client_secret.into();
        let code = code.into();
        let redirect_uri = redirect_uri.into();
        require("client_secret", &client_secret)?;
        require("code", &code)?;
        require("redirect_uri", &redirect_uri)?;
        Self::new(
            oauth_config,
            client_id,
            resource,
            ServicePrincipalSecret::authorization_code(code, client_secret, redirect_uri),
        )
    }

    /// Holder seeded with an existing token. It can only be renewed through
    /// the token's refresh token.
    pub fn from_manual_token(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        resource: impl Into<String>,
        token: Token,
    ) -> AzureResult<Self> {
        Self::from_manual_token_secret(
            oauth_config,
            client_id,
            resource,
            token,
            ServicePrincipalSecret::None,
        )
    }

    /// Holder seeded with an existing token and backed by `secret`.
    pub fn from_manual_token_secret(
        oauth_config: OAuthConfig,
        client_id: impl Into<String>,
        resource: impl Into<String>,
        token: Token,
        secret: ServicePrincipalSecret,
    ) -> AzureResult<Self> {
        if token.is_zero() {
            return Err(ConfigurationError::invalid("token", "must not be empty").into());
        }
        let mut holder = Self::new(oauth_config, client_id, resource, secret)?;
        holder.state.get_mut().token = token;
        Ok(holder)
    }

    /// System-assigned managed identity.
    pub fn from_msi(msi_endpoint: &str, resource: impl Into<String>) -> AzureResult<Self> {
        Self::msi(msi_endpoint, resource.into(), None)
    }

    /// User-assigned managed identity.
    pub fn from_msi_with_user_assigned_id(
        msi_endpoint: &str,
        resource: impl Into<String>,
        user_assigned_id: impl Into<String>,
    ) -> AzureResult<Self> {
        let user_assigned_id = user_assigned_id.into();
        require("user_assigned_id", &user_assigned_id)?;
        Self::msi(msi_endpoint, resource.into(), Some(user_assigned_id))
    }

    fn msi(msi_endpoint: &str, resource: String, client_id: Option<String>) -> AzureResult<Self> {
        let oauth_config = OAuthConfig::from_token_endpoint(msi_endpoint)?;
        let mut holder = Self::new(
            oauth_config,
            client_id.clone().unwrap_or_else(|| "msi".to_string()),
            resource,
            ServicePrincipalSecret::ManagedIdentity { client_id },
        )?;
        holder.retry_policy = RetryPolicy::imds(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF);
        Ok(holder)
    }

    /// Default metadata service endpoint for virtual machines.
    pub fn msi_vm_endpoint() -> &'static str {
        MSI_ENDPOINT
    }

    /// Request proof-of-possession tokens bound to `key`.
    pub fn with_pop_key(mut self, key: Arc<dyn PopKey>) -> Self {
        self.pop_key = Some(key);
        self
    }

    pub fn set_auto_refresh(&mut self, auto_refresh: bool) {
        self.auto_refresh = auto_refresh;
    }

    /// Refresh once the token expires within `within`.
    pub fn set_refresh_within(&mut self, within: Duration) {
        self.refresh_within = within;
    }

    /// Send token requests through `sender`.
    pub fn set_sender(&mut self, sender: Arc<dyn Sender>) {
        self.sender = sender;
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    /// Run `callback` after each refresh. An error from it fails the refresh
    /// but the new token is kept.
    pub fn add_refresh_callback<F>(&mut self, callback: F)
    where
        F: Fn(&Token) -> AzureResult<()> + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> Token {
        self.state.read().await.token.clone()
    }

    /// Resource the holder currently targets.
    pub async fn resource(&self) -> String {
        self.state.read().await.resource.clone()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth_config
    }

    fn uses_msi(&self) -> bool {
        self.secret.is_managed_identity() || is_imds_endpoint(&self.oauth_config.token_endpoint)
    }

    fn request_pop(&self) -> Option<&Arc<dyn PopKey>> {
        self.pop_key.as_ref()
    }

    async fn build_form_request(
        &self,
        token: &Token,
        resource: &str,
    ) -> AzureResult<HttpRequest> {
        let token_endpoint = self.oauth_config.token_endpoint.as_str();
        let mut fields: Vec<(String, String)> = Vec::new();

        match token.refresh_token.as_deref().filter(|r| !r.is_empty()) {
            Some(refresh_token) => {
                fields.push(("grant_type".into(), GrantType::RefreshToken.as_str().into()));
                fields.push(("client_id".into(), self.client_id.clone()));
                fields.push(("refresh_token".into(), refresh_token.to_string()));
                if let ServicePrincipalSecret::AuthorizationCode { .. } = &self.secret {
                    let values = self.secret.authentication_values(
                        &self.client_id,
                        token_endpoint,
                        Utc::now().timestamp(),
                    )?;
                    fields.extend(values.into_iter().filter(|(k, _)| k == "client_secret"));
                }
            }
            None => {
                let grant = self.secret.grant_type().ok_or_else(|| {
                    ConfigurationError::invalid(
                        "secret",
                        "holder has neither a refresh token nor a secret able to request a token",
                    )
                })?;
                fields.push(("grant_type".into(), grant.as_str().into()));
                fields.push(("client_id".into(), self.client_id.clone()));
                fields.extend(self.secret.authentication_values(
                    &self.client_id,
                    token_endpoint,
                    Utc::now().timestamp(),
                )?);
            }
        }
        fields.push(("resource".into(), resource.to_string()));

        if let Some(key) = self.request_pop() {
            let req_cnf = serde_json::json!({ "kid": key.kid() });
            fields.push(("token_type".into(), TOKEN_TYPE_POP.into()));
            fields.push((
                "req_cnf".into(),
                URL_SAFE_NO_PAD.encode(serde_json::to_vec(&req_cnf)?),
            ));
        }

        Preparer::new(vec![as_post(), with_form_data(fields)])
            .prepare(HttpRequest::new(
                HttpMethod::Post,
                self.oauth_config.token_endpoint.clone(),
            ))
            .await
    }

    async fn build_request(&self, token: &Token, resource: &str) -> AzureResult<HttpRequest> {
        if self.uses_msi() {
            let client_id = match &self.secret {
                ServicePrincipalSecret::ManagedIdentity { client_id } => client_id.as_deref(),
                _ => None,
            };
            return build_msi_request(&self.oauth_config.token_endpoint, resource, client_id);
        }
        self.build_form_request(token, resource).await
    }

    fn decode_response(&self, response: HttpResponse, resource: &str) -> AzureResult<Token> {
        if response.status != 200 {
            let message = format!(
                "token endpoint returned status {}: {}",
                response.status,
                response.text()
            );
            return Err(AuthenticationError::with_response(message, response).into());
        }
        let mut token = Token::from_response_body(&response.body, Utc::now()).map_err(|e| {
            AzureError::from(AuthenticationError::with_response(
                format!("failed to decode token response: {}", e),
                response.clone(),
            ))
        })?;
        if token.resource.is_empty() {
            token.resource = resource.to_string();
        }
        if token.is_pop() {
            token.pop_key = self.pop_key.clone();
        }
        Ok(token)
    }

    /// Fetch a new token for `resource` and store it. Caller holds the write lock.
    async fn refresh_locked(
        &self,
        state: &mut TokenState,
        resource: &str,
        cancel: &CancellationToken,
    ) -> AzureResult<()> {
        let request = self
            .build_request(&state.token, resource)
            .await?
            .with_cancel(cancel.clone());
        debug!(
            host = self.oauth_config.token_endpoint.host_str().unwrap_or(""),
            path = self.oauth_config.token_endpoint.path(),
            resource = resource,
            msi = self.uses_msi(),
            "Refreshing token"
        );

        let response = match send_with_retry(self.sender.as_ref(), request, &self.retry_policy).await {
            Ok(response) => response,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(error = %error, "Token request failed");
                return Err(AuthenticationError::new(format!(
                    "failed to send token request: {}",
                    error
                ))
                .into());
            }
        };

        let token = self.decode_response(response, resource)?;
        info!(
            resource = resource,
            expires_on = token.expires_on,
            token_type = %token.token_type,
            "Token refreshed"
        );
        state.token = token;

        for callback in &self.callbacks {
            callback(&state.token)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Refresher for ServicePrincipalToken {
    async fn ensure_fresh(&self, cancel: &CancellationToken) -> AzureResult<()> {
        if !self.auto_refresh {
            return Ok(());
        }
        if !self.state.read().await.token.will_expire_in(self.refresh_within) {
            return Ok(());
        }

        let mut state = self.state.write().await;
        if state.token.will_expire_in(self.refresh_within) {
            let resource = state.resource.clone();
            self.refresh_locked(&mut state, &resource, cancel).await?;
        }
        Ok(())
    }

    async fn refresh(&self, cancel: &CancellationToken) -> AzureResult<()> {
        let mut state = self.state.write().await;
        let resource = state.resource.clone();
        self.refresh_locked(&mut state, &resource, cancel).await
    }

    async fn refresh_exchange(&self, resource: &str, cancel: &CancellationToken) -> AzureResult<()> {
        require("resource", resource)?;
        let mut state = self.state.write().await;
        self.refresh_locked(&mut state, resource, cancel).await?;
        state.resource = resource.to_string();
        Ok(())
    }
}

#[async_trait]
impl OAuthTokenProvider for ServicePrincipalToken {
    async fn oauth_token(&self) -> String {
        self.state.read().await.token.access_token.clone()
    }

    async fn authorization_value(&self, host: &str) -> AzureResult<String> {
        let token = self.token().await;
        match (&token.pop_key, token.is_pop()) {
            (Some(key), true) => {
                let signed = pop_token(&token.access_token, key.as_ref(), host, Utc::now().timestamp())?;
                Ok(format!("{} {}", POP_AUTHORIZATION_SCHEME, signed))
            }
            _ => Ok(format!("Bearer {}", token.access_token)),
        }
    }

    fn refresher(&self) -> Option<&dyn Refresher> {
        Some(self)
    }
}

impl fmt::Debug for ServicePrincipalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipalToken")
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.oauth_config.token_endpoint.as_str())
            .field("secret", &self.secret)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_within", &self.refresh_within)
            .finish()
    }
}

/// Tokens for a primary tenant and its auxiliary tenants.
pub struct MultiTenantServicePrincipalToken {
    primary: ServicePrincipalToken,
    auxiliary: Vec<ServicePrincipalToken>,
}

impl MultiTenantServicePrincipalToken {
    pub fn new(
        config: &MultiTenantOAuthConfig,
        client_id: impl Into<String>,
        secret: ServicePrincipalSecret,
        resource: impl Into<String>,
    ) -> AzureResult<Self> {
        let client_id = client_id.into();
        let resource = resource.into();
        let primary = ServicePrincipalToken::new(
            config.primary_tenant().clone(),
            client_id.clone(),
            resource.clone(),
            secret.clone(),
        )?;
        let auxiliary = config
            .auxiliary_tenants()
            .iter()
            .map(|tenant| {
                ServicePrincipalToken::new(
                    tenant.clone(),
                    client_id.clone(),
                    resource.clone(),
                    secret.clone(),
                )
            })
            .collect::<AzureResult<Vec<_>>>()?;
        Ok(Self { primary, auxiliary })
    }

    /// Route every tenant's token requests through `sender`.
    pub fn set_sender(&mut self, sender: Arc<dyn Sender>) {
        self.primary.set_sender(sender.clone());
        for token in &mut self.auxiliary {
            token.set_sender(sender.clone());
        }
    }

    pub fn primary(&self) -> &ServicePrincipalToken {
        &self.primary
    }

    pub fn auxiliary(&self) -> &[ServicePrincipalToken] {
        &self.auxiliary
    }

    /// Ensure every tenant's token is fresh.
    pub async fn ensure_fresh(&self, cancel: &CancellationToken) -> AzureResult<()> {
        self.primary.ensure_fresh(cancel).await?;
        for token in &self.auxiliary {
            token.ensure_fresh(cancel).await?;
        }
        Ok(())
    }

    pub async fn primary_oauth_token(&self) -> String {
        self.primary.oauth_token().await
    }

    pub async fn auxiliary_oauth_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.auxiliary.len());
        for token in &self.auxiliary {
            tokens.push(token.oauth_token().await);
        }
        tokens
    }
}
