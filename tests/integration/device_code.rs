//! Integration tests for the device code flow

use super::*;
use azure_rest::{
    AzureError, DeviceAuthorizationFlow, DeviceAuthorizationFlowImpl, DeviceFlowError, ReqwestSender,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_device_code(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/T/oauth2/devicecode"))
        .and(body_string_contains("client_id=C"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-123",
            "user_code": "ABCD-EFGH",
            "verification_url": "https://microsoft.com/devicelogin",
            "expires_in": "900",
            "interval": "1",
            "message": "To sign in, use a web browser to open the page https://microsoft.com/devicelogin",
        })))
        .expect(1)
        .mount(mock_server)
        .await;
}

fn flow() -> DeviceAuthorizationFlowImpl {
    DeviceAuthorizationFlowImpl::new(Arc::new(ReqwestSender::new().unwrap()))
}

#[tokio::test]
async fn test_device_code_sign_in() {
    let mock_server = setup_mock_server().await;
    mount_device_code(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .and(body_string_contains("code=device-123"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "the user has not yet finished authenticating",
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .and(body_string_contains("grant_type=device_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("device-token")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let flow = flow();
    let code = flow
        .initiate_device_auth(&oauth_config(&mock_server), CLIENT_ID, RESOURCE)
        .await
        .unwrap();
    assert_eq!(code.user_code, "ABCD-EFGH");

    let token = flow
        .wait_for_user_completion(&code, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(token.access_token, "device-token");
    assert_eq!(token.resource, RESOURCE);
}

#[tokio::test]
async fn test_declined_sign_in() {
    let mock_server = setup_mock_server().await;
    mount_device_code(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/T/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_declined"})))
        .mount(&mock_server)
        .await;

    let flow = flow();
    let code = flow
        .initiate_device_auth(&oauth_config(&mock_server), CLIENT_ID, RESOURCE)
        .await
        .unwrap();
    let err = flow
        .wait_for_user_completion(&code, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AzureError::DeviceFlow(DeviceFlowError::AccessDenied)));
}
