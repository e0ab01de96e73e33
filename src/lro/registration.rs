//! Resource Provider Registration
//!
//! Recovers from `409 MissingSubscriptionRegistration` by registering the
//! provider namespace named in the error, waiting for the registration to
//! complete, and replaying the original request.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::core::{HttpMethod, HttpRequest, HttpResponse, RetriableRequest, SendDecorator, Sender};
use crate::error::{
    AzureError, AzureResult, ConfigurationError, PollingError, ProtocolError, RequestError,
    ServiceError,
};
use crate::lro::polling::PollingConfig;
use crate::resilience::retry::{get_retry_after, sleep_with_cancel};

pub const MISSING_SUBSCRIPTION_REGISTRATION: &str = "MissingSubscriptionRegistration";
pub const REGISTRATION_API_VERSION: &str = "2016-09-01";
pub const REGISTERED_STATE: &str = "Registered";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Provider {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    registration_state: String,
}

/// Provider namespace to register, when `response` asks for one.
pub fn missing_registration(response: &HttpResponse) -> Option<ServiceError> {
    if response.status != 409 {
        return None;
    }
    ServiceError::from_body(&response.body)
        .filter(|e| e.code.eq_ignore_ascii_case(MISSING_SUBSCRIPTION_REGISTRATION))
}

/// Subscription id following the `subscriptions` segment of `url`.
pub fn subscription_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments
        .by_ref()
        .find(|s| s.eq_ignore_ascii_case("subscriptions"))?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn provider_url(base: &Url, subscription: &str, namespace: &str, register: bool) -> AzureResult<Url> {
    let mut path = format!("/subscriptions/{}/providers/{}", subscription, namespace);
    if register {
        path.push_str("/register");
    }
    let mut url = base.join(&path).map_err(|e| ConfigurationError::InvalidUrl {
        url: path.clone(),
        message: e.to_string(),
    })?;
    url.set_query(Some(&format!("api-version={}", REGISTRATION_API_VERSION)));
    Ok(url)
}

fn decode_provider(response: &HttpResponse) -> AzureResult<Provider> {
    if !response.is_success() {
        return Err(RequestError::from_response(response).into());
    }
    response.json::<Provider>()
}

/// Register the provider named by `error` for the subscription of `original`
/// and wait until it reports `Registered`.
pub async fn register<S>(
    sender: &S,
    original: &HttpRequest,
    error: &ServiceError,
    config: &PollingConfig,
) -> AzureResult<()>
where
    S: Sender + ?Sized,
{
    let cancel = original.cancel_token();
    let subscription = subscription_id(&original.url).ok_or_else(|| {
        ConfigurationError::invalid("url", "no subscription id in request path")
    })?;
    let namespace = error.first_detail_target().ok_or_else(|| ProtocolError::InvalidResponse {
        message: "registration error carries no provider namespace".to_string(),
    })?;

    info!(
        subscription_id = %subscription,
        namespace = %namespace,
        "Registering resource provider"
    );
    let register = HttpRequest::new(
        HttpMethod::Post,
        provider_url(&original.url, &subscription, namespace, true)?,
    )
    .with_cancel(cancel.clone());
    let response = sender.send(register).await?;
    let mut provider = decode_provider(&response)?;

    let poll_url = provider_url(&original.url, &subscription, namespace, false)?;
    let started = Instant::now();
    let mut response = response;
    while !provider.registration_state.eq_ignore_ascii_case(REGISTERED_STATE) {
        let delay = get_retry_after(&response).unwrap_or(config.delay);
        if let Some(budget) = config.duration {
            if started.elapsed() + delay > budget {
                return Err(PollingError::DurationExceeded { duration: budget }.into());
            }
        }
        debug!(
            namespace = %namespace,
            state = %provider.registration_state,
            delay_ms = delay.as_millis() as u64,
            "Waiting for provider registration"
        );
        if !sleep_with_cancel(delay, &cancel).await {
            return Err(AzureError::cancelled("waiting for provider registration"));
        }

        let poll = HttpRequest::new(HttpMethod::Get, poll_url.clone()).with_cancel(cancel.clone());
        response = sender.send(poll).await?;
        provider = decode_provider(&response)?;
    }

    info!(namespace = %provider.namespace, "Resource provider registered");
    Ok(())
}

/// Send `request`, registering the provider and replaying once if the
/// subscription is not registered for it.
pub async fn send_with_registration<S>(
    sender: &S,
    request: HttpRequest,
    config: &PollingConfig,
) -> AzureResult<HttpResponse>
where
    S: Sender + ?Sized,
{
    let mut request = request;
    request.ensure_cancel();
    let mut retriable = RetriableRequest::new(request);
    let response = sender.send(retriable.prepare()?).await?;

    let Some(error) = missing_registration(&response) else {
        return Ok(response);
    };
    register(sender, retriable.request(), &error, config)
        .await
        .map_err(AzureError::registration)?;
    sender.send(retriable.prepare()?).await
}

struct RegistrationSender {
    inner: Arc<dyn Sender>,
    config: PollingConfig,
}

#[async_trait]
impl Sender for RegistrationSender {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        send_with_registration(self.inner.as_ref(), request, &self.config).await
    }
}

/// Auto-register missing resource providers. The wrapped sender must
/// authorize requests itself.
pub fn with_registration(config: PollingConfig) -> SendDecorator {
    Box::new(move |inner: Arc<dyn Sender>| -> Arc<dyn Sender> {
        Arc::new(RegistrationSender { inner, config })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{decorate_sender, MockSender};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const URL: &str =
        "https://management.example/subscriptions/SUB/resourceGroups/rg/providers/Microsoft.X/things/t1?api-version=2020-01-01";

    fn conflict() -> HttpResponse {
        HttpResponse::new(409).with_json(&json!({
            "error": {
                "code": "MissingSubscriptionRegistration",
                "message": "The subscription is not registered to use namespace 'Microsoft.X'",
                "details": [{"code": "MissingSubscriptionRegistration", "target": "Microsoft.X"}],
            }
        }))
    }

    fn provider(state: &str) -> HttpResponse {
        HttpResponse::new(200).with_json(&json!({
            "id": "/subscriptions/SUB/providers/Microsoft.X",
            "namespace": "Microsoft.X",
            "registrationState": state,
        }))
    }

    fn config() -> PollingConfig {
        PollingConfig::new(Duration::from_secs(5), None)
    }

    fn put() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Put, URL).unwrap().with_body("{\"name\":\"t1\"}")
    }

    #[test]
    fn test_subscription_id() {
        let url = Url::parse(URL).unwrap();
        assert_eq!(subscription_id(&url).as_deref(), Some("SUB"));

        let upper = Url::parse("https://m.example/Subscriptions/abc/x").unwrap();
        assert_eq!(subscription_id(&upper).as_deref(), Some("abc"));

        let none = Url::parse("https://m.example/tenants/abc").unwrap();
        assert!(subscription_id(&none).is_none());
    }

    #[test]
    fn test_missing_registration_detection() {
        assert!(missing_registration(&conflict()).is_some());

        let other = HttpResponse::new(409).with_json(&json!({"error": {"code": "Conflict"}}));
        assert!(missing_registration(&other).is_none());

        let wrong_status = HttpResponse::new(400).with_body(conflict().body);
        assert!(missing_registration(&wrong_status).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_polls_and_replays() {
        let mock = MockSender::new();
        mock.queue_response(conflict());
        mock.queue_response(provider("Registering"));
        mock.queue_response(provider("Registering"));
        mock.queue_response(provider("Registered"));
        mock.queue_response(HttpResponse::new(200).with_json(&json!({"name": "t1"})));

        let response = send_with_registration(&mock, put(), &config()).await.unwrap();
        assert_eq!(response.status, 200);

        let requests = mock.requests();
        let calls: Vec<String> = requests
            .iter()
            .map(|r| format!("{} {}?{}", r.method, r.url.path(), r.url.query().unwrap_or("")))
            .collect();
        pretty_assertions::assert_eq!(
            calls,
            vec![
                "PUT /subscriptions/SUB/resourceGroups/rg/providers/Microsoft.X/things/t1?api-version=2020-01-01",
                "POST /subscriptions/SUB/providers/Microsoft.X/register?api-version=2016-09-01",
                "GET /subscriptions/SUB/providers/Microsoft.X?api-version=2016-09-01",
                "GET /subscriptions/SUB/providers/Microsoft.X?api-version=2016-09-01",
                "PUT /subscriptions/SUB/resourceGroups/rg/providers/Microsoft.X/things/t1?api-version=2020-01-01",
            ]
        );
        assert_eq!(requests[4].body_text().as_deref(), Some("{\"name\":\"t1\"}"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_registered_replays_immediately() {
        let mock = MockSender::new();
        mock.queue_response(conflict());
        mock.queue_response(provider("Registered"));
        mock.queue_response(HttpResponse::new(201));

        let started = Instant::now();
        let response = send_with_registration(&mock, put(), &config()).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(mock.request_count(), 3);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_failure_is_wrapped() {
        let mock = MockSender::new();
        mock.queue_response(conflict());
        mock.queue_response(HttpResponse::new(403).with_json(&json!({
            "error": {"code": "AuthorizationFailed", "message": "no"}
        })));

        let err = send_with_registration(&mock, put(), &config()).await.unwrap_err();
        assert_eq!(err.error_code(), "AZURE_REGISTRATION");
        assert_eq!(err.status_code(), Some(403));
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_namespace_is_wrapped() {
        let mock = MockSender::new();
        mock.queue_response(HttpResponse::new(409).with_json(&json!({
            "error": {"code": "MissingSubscriptionRegistration", "message": "x"}
        })));

        let err = send_with_registration(&mock, put(), &config()).await.unwrap_err();
        assert!(matches!(err, AzureError::Registration { .. }));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_and_cancel() {
        let mock = MockSender::new();
        mock.queue_response(conflict());
        mock.set_default_response(provider("Registering"));
        let budget = PollingConfig::new(Duration::from_secs(5), Some(Duration::from_secs(12)));

        let err = send_with_registration(&mock, put(), &budget).await.unwrap_err();
        assert!(matches!(
            &err,
            AzureError::Registration { source } if matches!(**source, AzureError::Polling(PollingError::DurationExceeded { .. }))
        ));

        let mock = MockSender::new();
        mock.queue_response(conflict());
        mock.set_default_response(provider("Registering"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let err = send_with_registration(&mock, put().with_cancel(cancel), &config())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_with_registration_decorator_passes_through() {
        let mock = Arc::new(MockSender::new());
        mock.queue_response(HttpResponse::new(409).with_json(&json!({"error": {"code": "Conflict"}})));
        let sender = decorate_sender(mock.clone(), vec![with_registration(config())]);

        let response = sender.send(put()).await.unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(mock.request_count(), 1);
    }
}
