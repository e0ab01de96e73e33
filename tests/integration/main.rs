//! Integration tests using WireMock
//!
//! These tests drive the reqwest sender against a mock HTTP server and cover
//! the full request/response cycle: token acquisition, authorization, retry,
//! long-running operation polling and provider registration.

mod challenge;
mod client_credentials;
mod device_code;
mod long_running;
mod registration;

use azure_rest::{
    client_config, BearerAuthorizer, Client, OAuthConfig, ServicePrincipalToken, Token,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TENANT: &str = "T";
pub const CLIENT_ID: &str = "C";
pub const RESOURCE: &str = "https://mgmt.example/";

/// Helper to start a mock server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Endpoints for `TENANT` under the mock server.
pub fn oauth_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new(&format!("{}/", server.uri()), TENANT).unwrap()
}

/// Token endpoint success body for `access_token`.
pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": "3600",
        "expires_on": (Utc::now().timestamp() + 3600).to_string(),
        "resource": RESOURCE,
    })
}

/// Client authorized with a fresh manual token `A`, polling every second.
pub fn test_client(server: &MockServer) -> Client {
    let token = ServicePrincipalToken::from_manual_token(
        oauth_config(server),
        CLIENT_ID,
        RESOURCE,
        Token::new("A", Utc::now().timestamp() + 3600),
    )
    .unwrap();
    let config = client_config()
        .user_agent("integration-tests/1.0")
        .retry_attempts(3)
        .retry_backoff(Duration::from_millis(100))
        .polling_delay(Duration::from_secs(1))
        .polling_duration(Duration::from_secs(30))
        .build()
        .unwrap();

    Client::new(config)
        .unwrap()
        .with_authorizer(Arc::new(BearerAuthorizer::new(Arc::new(token))))
}
