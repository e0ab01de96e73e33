//! Integration tests for bearer challenge re-authorization

use super::*;
use azure_rest::{
    decorate_sender, with_bearer_challenge, Authorizer, AzureError, ChallengeCallback, HttpMethod,
    HttpRequest, ReqwestSender, Sender,
};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_challenge_reauthorizes_against_named_tenant() {
    let mock_server = setup_mock_server().await;
    let authority = format!("{}/other-tenant", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/secrets/db"))
        .and(header("authorization", "Bearer challenged"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "s3cret"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets/db"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!(r#"Bearer authorization="{}", resource="https://vault.example""#, authority).as_str(),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/other-tenant/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("challenged")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let directory = format!("{}/", mock_server.uri());
    let callback: ChallengeCallback = Arc::new(move |tenant: String, resource: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        let directory = directory.clone();
        async move {
            let holder = ServicePrincipalToken::from_secret(
                OAuthConfig::new(&directory, &tenant)?,
                CLIENT_ID,
                "S",
                resource,
            )?;
            let authorizer: Arc<dyn Authorizer> = Arc::new(BearerAuthorizer::new(Arc::new(holder)));
            Ok::<_, AzureError>(authorizer)
        }
        .boxed()
    });

    let sender = decorate_sender(
        Arc::new(ReqwestSender::new().unwrap()),
        vec![with_bearer_challenge(callback)],
    );
    let request = HttpRequest::parse(HttpMethod::Get, &format!("{}/secrets/db", mock_server.uri()))
        .unwrap()
        .with_cancel(CancellationToken::new());
    let response = sender.send(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
