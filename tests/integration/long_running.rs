//! Integration tests for long-running operation polling

use super::*;
use azure_rest::{AzureError, HttpMethod, HttpRequest, PollingError};
use std::time::Instant;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

const THING: &str = "/subscriptions/SUB/resourceGroups/rg/providers/Microsoft.X/things/t1";

async fn mount_accepted(mock_server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(THING))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Azure-AsyncOperation", format!("{}/op/1", mock_server.uri()).as_str())
                .insert_header("Retry-After", "1"),
        )
        .expect(1)
        .mount(mock_server)
        .await;
}

async fn mount_in_progress(mock_server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/op/1"))
        .and(header("authorization", "Bearer A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op1", "status": "InProgress"})))
        .up_to_n_times(times)
        .expect(times)
        .mount(mock_server)
        .await;
}

fn put(mock_server: &MockServer) -> HttpRequest {
    HttpRequest::parse(HttpMethod::Put, &format!("{}{}?api-version=2021-01-01", mock_server.uri(), THING))
        .unwrap()
        .with_body(r#"{"location":"westus"}"#)
}

#[tokio::test]
async fn test_async_operation_succeeds() {
    let mock_server = setup_mock_server().await;
    mount_accepted(&mock_server).await;
    mount_in_progress(&mock_server, 2).await;
    Mock::given(method("GET"))
        .and(path("/op/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op1", "status": "Succeeded"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let started = Instant::now();
    let response = test_client(&mock_server)
        .send_and_poll(put(&mock_server))
        .await
        .unwrap();

    assert_eq!(response.json::<Value>().unwrap()["status"], "Succeeded");
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_async_operation_fails_with_code() {
    let mock_server = setup_mock_server().await;
    mount_accepted(&mock_server).await;
    mount_in_progress(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/op/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "op1",
            "status": "Failed",
            "error": {"code": "BadArgument", "message": "location is not supported"},
        })))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .send_and_poll(put(&mock_server))
        .await
        .unwrap_err();

    assert!(matches!(err, AzureError::Polling(PollingError::OperationFailed { .. })));
    assert!(err.to_string().contains("BadArgument"));
}

#[tokio::test]
async fn test_location_polling_without_async_header() {
    let mock_server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/actions/restart"))
        .respond_with(
            ResponseTemplate::new(202).insert_header("Location", format!("{}/status/9", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/9"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/9"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let request =
        HttpRequest::parse(HttpMethod::Post, &format!("{}/actions/restart", mock_server.uri())).unwrap();
    let response = test_client(&mock_server).send_and_poll(request).await.unwrap();

    assert_eq!(response.status, 204);
    let polls = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/status/9")
        .count();
    assert_eq!(polls, 2);
}
