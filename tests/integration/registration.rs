//! Integration tests for resource provider auto-registration

use super::*;
use azure_rest::{HttpMethod, HttpRequest, Sender};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const THING: &str = "/subscriptions/SUB/resourceGroups/rg/providers/Microsoft.X/things/t1";

fn provider(state: &str) -> Value {
    json!({
        "id": "/subscriptions/SUB/providers/Microsoft.X",
        "namespace": "Microsoft.X",
        "registrationState": state,
    })
}

#[tokio::test]
async fn test_registers_provider_and_replays() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("PUT"))
        .and(path(THING))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {
                "code": "MissingSubscriptionRegistration",
                "message": "The subscription is not registered to use namespace 'Microsoft.X'.",
                "details": [{"code": "MissingSubscriptionRegistration", "target": "Microsoft.X"}],
            }
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path(THING))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "t1"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscriptions/SUB/providers/Microsoft.X/register"))
        .and(query_param("api-version", "2016-09-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider("Registering")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/SUB/providers/Microsoft.X"))
        .and(query_param("api-version", "2016-09-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider("Registering")))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/SUB/providers/Microsoft.X"))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider("Registered")))
        .mount(&mock_server)
        .await;

    let request = HttpRequest::parse(
        HttpMethod::Put,
        &format!("{}{}?api-version=2021-01-01", mock_server.uri(), THING),
    )
    .unwrap()
    .with_body(r#"{"location":"westus"}"#);
    let response = test_client(&mock_server).send(request).await.unwrap();
    assert_eq!(response.status, 200);

    let received = mock_server.received_requests().await.unwrap();
    let calls: Vec<String> = received
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect();
    pretty_assertions::assert_eq!(
        calls,
        vec![
            format!("PUT {}", THING),
            "POST /subscriptions/SUB/providers/Microsoft.X/register".to_string(),
            "GET /subscriptions/SUB/providers/Microsoft.X".to_string(),
            "GET /subscriptions/SUB/providers/Microsoft.X".to_string(),
            format!("PUT {}", THING),
        ]
    );
    assert_eq!(received[4].body, br#"{"location":"westus"}"#.to_vec());
}
