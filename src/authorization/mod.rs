//! Authorization
//!
//! Authorizers turn credentials into a prepare decorator that stamps each
//! outgoing request.
//!
//! This module provides:
//!
//! - **Bearer**: OAuth token with automatic refresh
//! - **Multi-tenant Bearer**: primary token plus `x-ms-authorization-auxiliary`
//! - **Bearer Challenge**: re-authorize once when the service answers with a `Bearer` challenge
//! - **API Key / SAS / Basic**: static credentials
//! - **Settings**: authorizers built from environment variables or a credentials file

pub mod challenge;
pub mod settings;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{
    prepare_fn, HttpRequest, PrepareDecorator, HEADER_AUTHORIZATION,
    HEADER_AUXILIARY_AUTHORIZATION,
};
use crate::error::{AuthenticationError, AzureError, AzureResult, ConfigurationError};
use crate::token::{MultiTenantServicePrincipalToken, OAuthTokenProvider};

pub use challenge::{with_bearer_challenge, ChallengeCallback};
pub use settings::{
    get_settings_from_environment, get_settings_from_file, CredentialKind, EnvironmentSettings,
    FileSettings,
};

/// Source of a prepare decorator that adds credentials to a request.
pub trait Authorizer: Send + Sync {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator>;
}

fn refresh_failure(error: AzureError, request: &HttpRequest) -> AzureError {
    match error {
        AzureError::Cancelled { .. } | AzureError::Authentication(_) => error,
        other => {
            let message = format!(
                "failed to refresh the token for the request to {}: {}",
                request.url, other
            );
            match other.response().cloned() {
                Some(response) => AuthenticationError::with_response(message, response).into(),
                None => AuthenticationError::new(message).into(),
            }
        }
    }
}

/// Adds `Authorization: Bearer <token>`, refreshing the token first when it
/// is close to expiry.
#[derive(Clone)]
pub struct BearerAuthorizer {
    provider: Arc<dyn OAuthTokenProvider>,
}

impl BearerAuthorizer {
    pub fn new(provider: Arc<dyn OAuthTokenProvider>) -> Self {
        Self { provider }
    }

    pub fn token_provider(&self) -> &Arc<dyn OAuthTokenProvider> {
        &self.provider
    }
}

struct BearerDecorator {
    provider: Arc<dyn OAuthTokenProvider>,
}

#[async_trait]
impl PrepareDecorator for BearerDecorator {
    async fn prepare(&self, mut request: HttpRequest) -> AzureResult<HttpRequest> {
        if let Some(refresher) = self.provider.refresher() {
            let cancel = request.cancel_token();
            if let Err(error) = refresher.ensure_fresh(&cancel).await {
                warn!(url = %request.url, error = %error, "Token refresh failed");
                return Err(refresh_failure(error, &request));
            }
        }
        let host = request.url.host_str().unwrap_or_default().to_string();
        let value = self.provider.authorization_value(&host).await?;
        request.set_header(HEADER_AUTHORIZATION, value);
        Ok(request)
    }
}

impl Authorizer for BearerAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        Arc::new(BearerDecorator {
            provider: self.provider.clone(),
        })
    }
}

/// Bearer authorizer for a primary tenant plus auxiliary tenants.
#[derive(Clone)]
pub struct MultiTenantBearerAuthorizer {
    tokens: Arc<MultiTenantServicePrincipalToken>,
}

impl MultiTenantBearerAuthorizer {
    pub fn new(tokens: Arc<MultiTenantServicePrincipalToken>) -> Self {
        Self { tokens }
    }
}

struct MultiTenantBearerDecorator {
    tokens: Arc<MultiTenantServicePrincipalToken>,
}

#[async_trait]
impl PrepareDecorator for MultiTenantBearerDecorator {
    async fn prepare(&self, mut request: HttpRequest) -> AzureResult<HttpRequest> {
        let cancel = request.cancel_token();
        if let Err(error) = self.tokens.ensure_fresh(&cancel).await {
            return Err(refresh_failure(error, &request));
        }
        let primary = self.tokens.primary_oauth_token().await;
        request.set_header(HEADER_AUTHORIZATION, format!("Bearer {}", primary));

        let auxiliary: Vec<String> = self
            .tokens
            .auxiliary_oauth_tokens()
            .await
            .into_iter()
            .map(|t| format!("Bearer {}", t))
            .collect();
        if !auxiliary.is_empty() {
            request.set_header(HEADER_AUXILIARY_AUTHORIZATION, auxiliary.join(", "));
        }
        Ok(request)
    }
}

impl Authorizer for MultiTenantBearerAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        Arc::new(MultiTenantBearerDecorator {
            tokens: self.tokens.clone(),
        })
    }
}

/// Adds fixed headers and query parameters.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyAuthorizer {
    headers: BTreeMap<String, String>,
    query_parameters: BTreeMap<String, String>,
}

impl ApiKeyAuthorizer {
    pub fn new(
        headers: BTreeMap<String, String>,
        query_parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            headers,
            query_parameters,
        }
    }

    pub fn with_headers(headers: BTreeMap<String, String>) -> Self {
        Self::new(headers, BTreeMap::new())
    }

    pub fn with_query_parameters(query_parameters: BTreeMap<String, String>) -> Self {
        Self::new(BTreeMap::new(), query_parameters)
    }
}

impl Authorizer for ApiKeyAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        let headers = self.headers.clone();
        let query = self.query_parameters.clone();
        prepare_fn(move |mut request| {
            for (name, value) in &headers {
                request.set_header(name, value.clone());
            }
            if !query.is_empty() {
                let mut pairs = request.url.query_pairs_mut();
                for (name, value) in &query {
                    pairs.append_pair(name, value);
                }
            }
            Ok(request)
        })
    }
}

/// Appends a shared access signature to the query string.
#[derive(Clone)]
pub struct SasTokenAuthorizer {
    sas: SecretString,
}

impl SasTokenAuthorizer {
    pub fn new(sas_token: impl Into<String>) -> AzureResult<Self> {
        let sas = sas_token.into();
        let sas = sas.trim().trim_start_matches('?').to_string();
        if sas.is_empty() {
            return Err(ConfigurationError::empty("sas_token").into());
        }
        Ok(Self {
            sas: SecretString::new(sas),
        })
    }
}

impl Authorizer for SasTokenAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        let sas = self.sas.clone();
        prepare_fn(move |mut request| {
            let query = match request.url.query().filter(|q| !q.is_empty()) {
                Some(existing) => format!("{}&{}", existing, sas.expose_secret()),
                None => sas.expose_secret().clone(),
            };
            request.url.set_query(Some(&query));
            Ok(request)
        })
    }
}

/// Adds `Authorization: Basic <base64(user:password)>`.
#[derive(Clone)]
pub struct BasicAuthorizer {
    encoded: SecretString,
}

impl BasicAuthorizer {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            encoded: SecretString::new(STANDARD.encode(format!("{}:{}", username, password))),
        }
    }
}

impl Authorizer for BasicAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        let encoded = self.encoded.clone();
        prepare_fn(move |mut request| {
            request.set_header(
                HEADER_AUTHORIZATION,
                format!("Basic {}", encoded.expose_secret()),
            );
            Ok(request)
        })
    }
}

/// Leaves requests untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAuthorizer;

impl Authorizer for NullAuthorizer {
    fn with_authorization(&self) -> Arc<dyn PrepareDecorator> {
        prepare_fn(|request| {
            debug!(url = %request.url, "Sending request without authorization");
            Ok(request)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpMethod, HttpResponse, MockSender};
    use crate::token::{Refresher, ServicePrincipalSecret, ServicePrincipalToken};
    use crate::types::{MultiTenantOAuthConfig, OAuthConfig, Token};
    use chrono::Utc;
    use serde_json::json;

    const RESOURCE: &str = "https://management.example.com/";

    fn request(url: &str) -> HttpRequest {
        HttpRequest::parse(HttpMethod::Get, url).unwrap()
    }

    fn oauth_config() -> OAuthConfig {
        OAuthConfig::new("https://login.example.com/", "tenant").unwrap()
    }

    #[tokio::test]
    async fn test_bearer_refreshes_stale_token() {
        let mut holder = ServicePrincipalToken::from_secret(oauth_config(), "client", "s", RESOURCE).unwrap();
        let mock = Arc::new(MockSender::new());
        holder.set_sender(mock.clone());
        mock.queue_json_response(200, &json!({"access_token": "fresh", "expires_in": 3600}));

        let authorizer = BearerAuthorizer::new(Arc::new(holder));
        let prepared = authorizer
            .with_authorization()
            .prepare(request("https://management.example.com/subscriptions"))
            .await
            .unwrap();

        assert_eq!(prepared.header("authorization"), Some("Bearer fresh"));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_bearer_refresh_failure_carries_response() {
        let mut holder = ServicePrincipalToken::from_secret(oauth_config(), "client", "s", RESOURCE).unwrap();
        let mock = Arc::new(MockSender::new());
        holder.set_sender(mock.clone());
        mock.queue_response(HttpResponse::new(401).with_body(r#"{"error":"invalid_client"}"#));

        let err = BearerAuthorizer::new(Arc::new(holder))
            .with_authorization()
            .prepare(request("https://management.example.com/"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "AZURE_AUTH");
        assert_eq!(err.response().unwrap().status, 401);
    }

    #[tokio::test]
    async fn test_bearer_without_refresher() {
        struct Static;

        #[async_trait]
        impl OAuthTokenProvider for Static {
            async fn oauth_token(&self) -> String {
                "static-token".to_string()
            }
        }

        let prepared = BearerAuthorizer::new(Arc::new(Static))
            .with_authorization()
            .prepare(request("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(prepared.header("authorization"), Some("Bearer static-token"));
    }

    #[tokio::test]
    async fn test_multi_tenant_sets_auxiliary_header() {
        let config =
            MultiTenantOAuthConfig::new("https://login.example.com/", "primary", &["aux1", "aux2"]).unwrap();
        let mut tokens = MultiTenantServicePrincipalToken::new(
            &config,
            "client",
            ServicePrincipalSecret::client_secret("s"),
            RESOURCE,
        )
        .unwrap();
        let mock = Arc::new(MockSender::new());
        tokens.set_sender(mock.clone());
        for access in ["p", "a1", "a2"] {
            mock.queue_json_response(200, &json!({"access_token": access, "expires_in": 3600}));
        }

        let prepared = MultiTenantBearerAuthorizer::new(Arc::new(tokens))
            .with_authorization()
            .prepare(request("https://management.example.com/"))
            .await
            .unwrap();

        assert_eq!(prepared.header("authorization"), Some("Bearer p"));
        assert_eq!(
            prepared.header("x-ms-authorization-auxiliary"),
            Some("Bearer a1, Bearer a2")
        );
    }

    #[tokio::test]
    async fn test_api_key_headers_and_query() {
        let authorizer = ApiKeyAuthorizer::new(
            BTreeMap::from([("Ocp-Apim-Subscription-Key".to_string(), "k1".to_string())]),
            BTreeMap::from([("code".to_string(), "k2".to_string())]),
        );
        let prepared = authorizer
            .with_authorization()
            .prepare(request("https://example.com/api?x=1"))
            .await
            .unwrap();
        assert_eq!(prepared.header("ocp-apim-subscription-key"), Some("k1"));
        assert_eq!(prepared.url.query(), Some("x=1&code=k2"));
    }

    #[tokio::test]
    async fn test_sas_token_appended_or_set() {
        let authorizer = SasTokenAuthorizer::new("?sv=2020&sig=abc").unwrap();

        let with_query = authorizer
            .with_authorization()
            .prepare(request("https://account.example.net/c?restype=container"))
            .await
            .unwrap();
        assert_eq!(with_query.url.query(), Some("restype=container&sv=2020&sig=abc"));

        let bare = authorizer
            .with_authorization()
            .prepare(request("https://account.example.net/c"))
            .await
            .unwrap();
        assert_eq!(bare.url.query(), Some("sv=2020&sig=abc"));

        assert!(SasTokenAuthorizer::new("?").is_err());
    }

    #[tokio::test]
    async fn test_basic_and_null() {
        let prepared = BasicAuthorizer::new("user", "pass")
            .with_authorization()
            .prepare(request("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(prepared.header("authorization"), Some("Basic dXNlcjpwYXNz"));

        let untouched = NullAuthorizer
            .with_authorization()
            .prepare(request("https://example.com/"))
            .await
            .unwrap();
        assert!(untouched.headers.is_empty());
    }

    #[tokio::test]
    async fn test_bearer_keeps_fresh_manual_token() {
        let token = Token::new("manual", Utc::now().timestamp() + 3600);
        let holder = Arc::new(
            ServicePrincipalToken::from_manual_token(oauth_config(), "client", RESOURCE, token).unwrap(),
        );
        let prepared = BearerAuthorizer::new(holder.clone())
            .with_authorization()
            .prepare(request("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(prepared.header("authorization"), Some("Bearer manual"));
        holder.ensure_fresh(&Default::default()).await.unwrap();
    }
}
