//! Integration tests for token acquisition and bearer authorization

use super::*;
use azure_rest::{HttpMethod, HttpRequest, Refresher, Sender, ServicePrincipalSecret};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_client_credentials_happy_path() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .and(query_param("api-version", "1.0"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(
            "grant_type=client_credentials&client_id=C&client_secret=S&resource=https%3A%2F%2Fmgmt.example%2F",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("A")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let holder =
        ServicePrincipalToken::from_secret(oauth_config(&mock_server), CLIENT_ID, "S", RESOURCE).unwrap();
    holder.refresh(&CancellationToken::new()).await.unwrap();

    let token = holder.token().await;
    assert_eq!(token.access_token, "A");
    let remaining = (token.expires() - Utc::now()).num_seconds();
    assert!((3598..=3600).contains(&remaining), "remaining: {}", remaining);
}

#[tokio::test]
async fn test_refresh_token_grant() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .and(body_string(
            "grant_type=refresh_token&client_id=C&refresh_token=R&resource=https%3A%2F%2Fmgmt.example%2F",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("B")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stale = Token::new("old", Utc::now().timestamp() - 60).with_refresh_token("R");
    let holder =
        ServicePrincipalToken::from_manual_token(oauth_config(&mock_server), CLIENT_ID, RESOURCE, stale)
            .unwrap();
    holder.ensure_fresh(&CancellationToken::new()).await.unwrap();

    assert_eq!(holder.token().await.access_token, "B");
}

#[tokio::test]
async fn test_bearer_authorizer_refreshes_before_request() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/SUB/resourceGroups"))
        .and(header("authorization", "Bearer fresh"))
        .and(header("user-agent", "integration-tests/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let holder = ServicePrincipalToken::new(
        oauth_config(&mock_server),
        CLIENT_ID,
        RESOURCE,
        ServicePrincipalSecret::client_secret("S"),
    )
    .unwrap();
    let config = client_config().user_agent("integration-tests/1.0").build().unwrap();
    let client = Client::new(config)
        .unwrap()
        .with_authorizer(Arc::new(BearerAuthorizer::new(Arc::new(holder))));

    let url = format!("{}/subscriptions/SUB/resourceGroups?api-version=2021-04-01", mock_server.uri());
    for _ in 0..2 {
        let response = client
            .send(HttpRequest::parse(HttpMethod::Get, &url).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
}

#[tokio::test]
async fn test_token_endpoint_rejection_carries_response() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "bad secret",
        })))
        .mount(&mock_server)
        .await;

    let holder =
        ServicePrincipalToken::from_secret(oauth_config(&mock_server), CLIENT_ID, "wrong", RESOURCE).unwrap();
    let err = holder.refresh(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.error_code(), "AZURE_AUTH");
    let response = err.response().unwrap();
    assert_eq!(response.status, 401);
    assert!(response.text().contains("invalid_client"));
}
