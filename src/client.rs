//! Client
//!
//! Ties the request pipeline together: authorization, user agent and
//! inspection on the way out; retry and resource-provider registration on
//! send; long-running operation polling on request.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::authorization::{Authorizer, NullAuthorizer};
use crate::core::{
    with_user_agent, HttpRequest, HttpResponse, PrepareDecorator, Preparer, ReqwestSender, Sender,
};
use crate::error::AzureResult;
use crate::lro::{
    poll_for_completion, response_has_started_operation, send_with_registration, PollingConfig,
};
use crate::resilience::{send_with_retry, RetryPolicy};
use crate::types::config::ClientConfig;

/// Observes every response before it is returned.
pub type ResponseInspector = Arc<dyn Fn(&HttpResponse) + Send + Sync>;

/// Client for a resource manager style REST service.
#[derive(Clone)]
pub struct Client {
    sender: Arc<dyn Sender>,
    authorizer: Arc<dyn Authorizer>,
    user_agent: String,
    retry_policy: RetryPolicy,
    polling: PollingConfig,
    request_inspector: Option<Arc<dyn PrepareDecorator>>,
    response_inspector: Option<ResponseInspector>,
    skip_resource_provider_registration: bool,
}

impl Client {
    /// Create a client sending through reqwest.
    pub fn new(config: ClientConfig) -> AzureResult<Self> {
        let sender = Arc::new(ReqwestSender::with_timeout(config.timeout)?);
        Ok(Self::with_sender(config, sender))
    }

    /// Create a client over a caller-supplied sender.
    pub fn with_sender(config: ClientConfig, sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            authorizer: Arc::new(NullAuthorizer),
            retry_policy: config.retry_policy(),
            polling: PollingConfig::new(config.polling_delay, config.polling_duration),
            user_agent: config.user_agent,
            request_inspector: None,
            response_inspector: None,
            skip_resource_provider_registration: config.skip_resource_provider_registration,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Run `inspector` last in the prepare stage.
    pub fn with_request_inspector(mut self, inspector: Arc<dyn PrepareDecorator>) -> Self {
        self.request_inspector = Some(inspector);
        self
    }

    pub fn with_response_inspector(mut self, inspector: ResponseInspector) -> Self {
        self.response_inspector = Some(inspector);
        self
    }

    /// Append a product token to the user agent.
    pub fn add_to_user_agent(&mut self, extension: &str) {
        let extension = extension.trim();
        if !extension.is_empty() {
            self.user_agent = format!("{} {}", self.user_agent, extension);
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn polling_config(&self) -> &PollingConfig {
        &self.polling
    }

    /// Stamp `request` with the user agent and credentials, then run the
    /// request inspector.
    pub async fn prepare(&self, request: HttpRequest) -> AzureResult<HttpRequest> {
        let mut preparer = Preparer::new(vec![
            with_user_agent(self.user_agent.clone()),
            self.authorizer.with_authorization(),
        ]);
        if let Some(inspector) = &self.request_inspector {
            preparer.push(inspector.clone());
        }
        preparer.prepare(request).await
    }

    async fn send_prepared(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let request = self.prepare(request).await?;
        self.sender.send(request).await
    }

    /// Send `request` and poll the long-running operation it starts, if any.
    pub async fn send_and_poll(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let mut request = request;
        request.ensure_cancel();
        let original = request.without_body();

        let response = self.send(request).await?;
        if !response_has_started_operation(&response) {
            return Ok(response);
        }
        debug!(
            method = %original.method,
            url = %original.url,
            status = response.status,
            "Polling long running operation"
        );
        poll_for_completion(self, &original, response, &self.polling).await
    }
}

struct Prepared<'a>(&'a Client);

#[async_trait]
impl Sender for Prepared<'_> {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        self.0.send_prepared(request).await
    }
}

struct Registering<'a>(&'a Client);

#[async_trait]
impl Sender for Registering<'_> {
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let client = self.0;
        if client.skip_resource_provider_registration {
            return client.send_prepared(request).await;
        }
        send_with_registration(&Prepared(client), request, &client.polling).await
    }
}

#[async_trait]
impl Sender for Client {
    /// Send with retry. Each attempt is prepared afresh and registers a
    /// missing resource provider unless disabled.
    async fn send(&self, request: HttpRequest) -> AzureResult<HttpResponse> {
        let response = send_with_retry(&Registering(self), request, &self.retry_policy).await?;
        if let Some(inspector) = &self.response_inspector {
            inspector(&response);
        }
        Ok(response)
    }
}
