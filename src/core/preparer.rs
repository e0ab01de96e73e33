//! Preparer
//!
//! Ordered prepare decorators that build an outgoing request.

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::core::transport::{Body, HttpMethod, HttpRequest};
use crate::core::{
    HEADER_AUTHORIZATION, HEADER_CLIENT_REQUEST_ID, HEADER_CONTENT_TYPE,
    HEADER_RETURN_CLIENT_REQUEST_ID, HEADER_USER_AGENT, MIME_FORM, MIME_JSON,
};
use crate::error::{AzureResult, ConfigurationError, ProtocolError};

/// Characters escaped when substituting path parameters (unreserved set kept).
const PATH_PARAMETER: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Maps a request to a mutated request.
#[async_trait]
pub trait PrepareDecorator: Send + Sync {
    async fn prepare(&self, request: HttpRequest) -> AzureResult<HttpRequest>;
}

struct PrepareFn<F>(F);

#[async_trait]
impl<F> PrepareDecorator for PrepareFn<F>
where
    F: Fn(HttpRequest) -> AzureResult<HttpRequest> + Send + Sync,
{
    async fn prepare(&self, request: HttpRequest) -> AzureResult<HttpRequest> {
        (self.0)(request)
    }
}

/// Lift a synchronous closure into a prepare decorator.
pub fn prepare_fn<F>(f: F) -> Arc<dyn PrepareDecorator>
where
    F: Fn(HttpRequest) -> AzureResult<HttpRequest> + Send + Sync + 'static,
{
    Arc::new(PrepareFn(f))
}

/// Ordered list of prepare decorators, applied first to last.
#[derive(Clone, Default)]
pub struct Preparer {
    decorators: Vec<Arc<dyn PrepareDecorator>>,
}

impl Preparer {
    pub fn new(decorators: Vec<Arc<dyn PrepareDecorator>>) -> Self {
        Self { decorators }
    }

    /// Append a decorator.
    pub fn with(mut self, decorator: Arc<dyn PrepareDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn push(&mut self, decorator: Arc<dyn PrepareDecorator>) {
        self.decorators.push(decorator);
    }

    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Run every decorator over `request`, stopping at the first error.
    pub async fn prepare(&self, mut request: HttpRequest) -> AzureResult<HttpRequest> {
        for decorator in &self.decorators {
            request = decorator.prepare(request).await?;
        }
        Ok(request)
    }
}

impl From<Vec<Arc<dyn PrepareDecorator>>> for Preparer {
    fn from(decorators: Vec<Arc<dyn PrepareDecorator>>) -> Self {
        Self::new(decorators)
    }
}

fn parse_url(url: &str) -> AzureResult<Url> {
    Url::parse(url).map_err(|e| {
        ConfigurationError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn append_path(url: &mut Url, path: &str) {
    let current = url.path().trim_end_matches('/').to_string();
    let extra = path.trim_start_matches('/');
    url.set_path(&format!("{}/{}", current, extra));
}

pub fn as_method(method: HttpMethod) -> Arc<dyn PrepareDecorator> {
    prepare_fn(move |mut r| {
        r.method = method;
        Ok(r)
    })
}

pub fn as_get() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Get)
}

pub fn as_post() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Post)
}

pub fn as_put() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Put)
}

pub fn as_patch() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Patch)
}

pub fn as_delete() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Delete)
}

pub fn as_head() -> Arc<dyn PrepareDecorator> {
    as_method(HttpMethod::Head)
}

/// Replace the request URL with `base`.
pub fn with_base_url(base: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    let base = base.into();
    prepare_fn(move |mut r| {
        r.url = parse_url(&base)?;
        Ok(r)
    })
}

/// Replace the request URL with `template` after substituting `{name}` host parameters.
pub fn with_custom_base_url(
    template: impl Into<String>,
    parameters: HashMap<String, String>,
) -> Arc<dyn PrepareDecorator> {
    let template = template.into();
    prepare_fn(move |mut r| {
        let mut base = template.clone();
        for (name, value) in &parameters {
            base = base.replace(&format!("{{{}}}", name), value);
        }
        r.url = parse_url(&base)?;
        Ok(r)
    })
}

/// Append a path to the URL path.
pub fn with_path(path: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    let path = path.into();
    prepare_fn(move |mut r| {
        append_path(&mut r.url, &path);
        Ok(r)
    })
}

/// Substitute escaped `{name}` parameters into `template` and append it to the URL path.
pub fn with_path_parameters(
    template: impl Into<String>,
    parameters: HashMap<String, String>,
) -> Arc<dyn PrepareDecorator> {
    let template = template.into();
    prepare_fn(move |mut r| {
        let mut path = template.clone();
        for (name, value) in &parameters {
            if value.is_empty() {
                return Err(ConfigurationError::empty(name.clone()).into());
            }
            let escaped = utf8_percent_encode(value, PATH_PARAMETER).to_string();
            path = path.replace(&format!("{{{}}}", name), &escaped);
        }
        append_path(&mut r.url, &path);
        Ok(r)
    })
}

/// Merge query parameters, URL-encoded. Repeated keys are appended.
pub fn with_query_parameters<K, V>(parameters: Vec<(K, V)>) -> Arc<dyn PrepareDecorator>
where
    K: Into<String>,
    V: Into<String>,
{
    let parameters: Vec<(String, String)> = parameters
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    prepare_fn(move |mut r| {
        if !parameters.is_empty() {
            let mut pairs = r.url.query_pairs_mut();
            for (key, value) in &parameters {
                pairs.append_pair(key, value);
            }
        }
        Ok(r)
    })
}

pub fn with_header(name: impl Into<String>, value: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    let name = name.into();
    let value = value.into();
    prepare_fn(move |mut r| {
        r.set_header(&name, value.clone());
        Ok(r)
    })
}

/// Set `Authorization: Bearer <token>`.
pub fn with_bearer_authorization(token: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    with_header(HEADER_AUTHORIZATION, format!("Bearer {}", token.into()))
}

pub fn as_content_type(content_type: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    with_header(HEADER_CONTENT_TYPE, content_type)
}

pub fn as_json() -> Arc<dyn PrepareDecorator> {
    as_content_type(MIME_JSON)
}

pub fn as_form_url_encoded() -> Arc<dyn PrepareDecorator> {
    as_content_type(MIME_FORM)
}

pub fn with_user_agent(user_agent: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    with_header(HEADER_USER_AGENT, user_agent)
}

/// Set `x-ms-client-request-id`.
pub fn with_client_request_id(id: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    with_header(HEADER_CLIENT_REQUEST_ID, id)
}

/// Set `x-ms-client-request-id` to a new UUID per prepare.
pub fn with_generated_client_request_id() -> Arc<dyn PrepareDecorator> {
    prepare_fn(|mut r| {
        r.set_header(HEADER_CLIENT_REQUEST_ID, uuid::Uuid::new_v4().to_string());
        Ok(r)
    })
}

pub fn with_return_client_request_id(value: bool) -> Arc<dyn PrepareDecorator> {
    with_header(HEADER_RETURN_CLIENT_REQUEST_ID, value.to_string())
}

/// URL-encoded form body. Pair order is kept.
pub fn with_form_data<K, V>(data: Vec<(K, V)>) -> Arc<dyn PrepareDecorator>
where
    K: Into<String>,
    V: Into<String>,
{
    let data: Vec<(String, String)> = data
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    prepare_fn(move |mut r| {
        let encoded = serde_urlencoded::to_string(&data)
            .map_err(|e| ConfigurationError::invalid("form data", e.to_string()))?;
        r.set_header(HEADER_CONTENT_TYPE, MIME_FORM);
        r.body = Body::Bytes(Bytes::from(encoded));
        Ok(r)
    })
}

/// JSON body.
pub fn with_json<T: Serialize>(value: &T) -> Arc<dyn PrepareDecorator> {
    let encoded = serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| e.to_string());
    prepare_fn(move |mut r| {
        let body = encoded.clone().map_err(|message| ProtocolError::InvalidJson { message })?;
        r.set_header(HEADER_CONTENT_TYPE, MIME_JSON);
        r.body = Body::Bytes(body);
        Ok(r)
    })
}

pub fn with_bytes(bytes: impl Into<Bytes>) -> Arc<dyn PrepareDecorator> {
    let bytes = bytes.into();
    prepare_fn(move |mut r| {
        r.body = Body::Bytes(bytes.clone());
        Ok(r)
    })
}

pub fn with_string(body: impl Into<String>) -> Arc<dyn PrepareDecorator> {
    with_bytes(Bytes::from(body.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Get, "https://placeholder.invalid").unwrap()
    }

    #[tokio::test]
    async fn test_decorators_apply_in_order() {
        let preparer = Preparer::new(vec![
            as_put(),
            with_base_url("https://management.example.com/"),
            with_path("a"),
            with_path("/b"),
        ]);
        let request = preparer.prepare(blank()).await.unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url.as_str(), "https://management.example.com/a/b");
    }

    #[tokio::test]
    async fn test_later_decorator_wins() {
        let preparer = Preparer::default()
            .with(with_header("x-test", "one"))
            .with(with_header("X-Test", "two"));
        let request = preparer.prepare(blank()).await.unwrap();
        assert_eq!(request.header("x-test"), Some("two"));
    }

    #[tokio::test]
    async fn test_path_parameters_are_escaped() {
        let mut params = HashMap::new();
        params.insert("subscriptionId".to_string(), "sub 1".to_string());
        params.insert("name".to_string(), "a/b".to_string());
        let preparer = Preparer::new(vec![
            with_base_url("https://h.example"),
            with_path_parameters("/subscriptions/{subscriptionId}/things/{name}", params),
        ]);
        let request = preparer.prepare(blank()).await.unwrap();
        assert_eq!(request.url.path(), "/subscriptions/sub%201/things/a%2Fb");
    }

    #[tokio::test]
    async fn test_empty_path_parameter_rejected() {
        let mut params = HashMap::new();
        params.insert("name".to_string(), String::new());
        let preparer = Preparer::new(vec![with_path_parameters("/x/{name}", params)]);
        assert!(preparer.prepare(blank()).await.is_err());
    }

    #[tokio::test]
    async fn test_query_parameters_merge_and_repeat() {
        let preparer = Preparer::new(vec![
            with_base_url("https://h.example/p?api-version=1"),
            with_query_parameters(vec![("tag", "a b"), ("tag", "c")]),
        ]);
        let request = preparer.prepare(blank()).await.unwrap();
        assert_eq!(request.url.query(), Some("api-version=1&tag=a+b&tag=c"));
    }

    #[tokio::test]
    async fn test_custom_base_url() {
        let mut params = HashMap::new();
        params.insert("vaultName".to_string(), "myvault".to_string());
        let preparer = Preparer::new(vec![with_custom_base_url(
            "https://{vaultName}.vault.example",
            params,
        )]);
        let request = preparer.prepare(blank()).await.unwrap();
        assert_eq!(request.url.host_str(), Some("myvault.vault.example"));
    }

    #[tokio::test]
    async fn test_invalid_base_url_fails() {
        let preparer = Preparer::new(vec![with_base_url("not a url")]);
        let err = preparer.prepare(blank()).await.unwrap_err();
        assert_eq!(err.error_code(), "AZURE_CONFIG");
    }

    #[tokio::test]
    async fn test_form_and_json_bodies() {
        let form = Preparer::new(vec![with_form_data(vec![
            ("grant_type", "client_credentials"),
            ("resource", "https://r/"),
        ])])
        .prepare(blank())
        .await
        .unwrap();
        assert_eq!(form.header("content-type"), Some(MIME_FORM));
        assert_eq!(
            form.body_text().as_deref(),
            Some("grant_type=client_credentials&resource=https%3A%2F%2Fr%2F")
        );

        let json = Preparer::new(vec![with_json(&serde_json::json!({"a": 1}))])
            .prepare(blank())
            .await
            .unwrap();
        assert_eq!(json.body_text().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(json.header("content-type"), Some(MIME_JSON));
    }

    #[tokio::test]
    async fn test_request_id_headers() {
        let request = Preparer::new(vec![
            with_generated_client_request_id(),
            with_return_client_request_id(true),
            with_bearer_authorization("tok"),
        ])
        .prepare(blank())
        .await
        .unwrap();
        assert_eq!(request.header(HEADER_CLIENT_REQUEST_ID).map(str::len), Some(36));
        assert_eq!(request.header(HEADER_RETURN_CLIENT_REQUEST_ID), Some("true"));
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
    }
}
