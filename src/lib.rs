//! Azure REST Runtime
//!
//! OAuth2 credential pipeline and HTTP request lifecycle for resource manager
//! style REST services.
//!
//! # Features
//!
//! - Service principal tokens: client secret, certificate assertion, password,
//!   authorization code, refresh token and managed identity (IMDS)
//! - Single in-flight, just-in-time token refresh with refresh callbacks
//! - Device code flow
//! - Bearer, multi-tenant, API key, SAS, basic and challenge authorizers
//! - Prepare / Send / Respond pipeline built from decorators
//! - Retry with exponential backoff and `Retry-After`
//! - Long-running operation polling (`Azure-AsyncOperation` and `Location`)
//! - Resource provider auto-registration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use azure_rest::{
//!     client_config, BearerAuthorizer, Client, HttpMethod, HttpRequest, OAuthConfig,
//!     ServicePrincipalToken,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let oauth = OAuthConfig::new("https://login.microsoftonline.com/", "my-tenant")?;
//!     let token = ServicePrincipalToken::from_secret(
//!         oauth,
//!         "my-client-id",
//!         "my-client-secret",
//!         "https://management.azure.com/",
//!     )?;
//!
//!     let client = Client::new(client_config().build()?)?
//!         .with_authorizer(Arc::new(BearerAuthorizer::new(Arc::new(token))));
//!
//!     let request = HttpRequest::parse(
//!         HttpMethod::Put,
//!         "https://management.azure.com/subscriptions/sub/resourceGroups/rg?api-version=2021-04-01",
//!     )?
//!     .with_body(r#"{"location":"westus"}"#);
//!
//!     let response = client.send_and_poll(request).await?;
//!     println!("status: {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: tokens, OAuth endpoints, cloud environments, device codes and configuration
//! - `error`: error hierarchy, service errors and bearer challenges
//! - `core`: transport, retriable requests and the prepare/send/respond decorators
//! - `resilience`: retry policy and cancel-aware delays
//! - `token`: token holders, secrets, proof-of-possession and CLI credentials
//! - `flows`: device code flow
//! - `authorization`: authorizers and settings loaders
//! - `lro`: long-running operation polling and provider registration
//! - `client`: pipeline wired behind one `Sender`

pub mod authorization;
pub mod builders;
pub mod client;
pub mod core;
pub mod date;
pub mod error;
pub mod flows;
pub mod lro;
pub mod resilience;
pub mod telemetry;
pub mod token;
pub mod types;
pub mod validation;

// Re-export main client
pub use client::{Client, ResponseInspector};

// Re-export builders
pub use builders::{client_config, ClientConfigBuilder};

// Re-export errors
pub use error::{
    AuthenticationError, AzureError, AzureResult, BearerChallenge, ConfigurationError,
    DeviceFlowError, PollingError, ProtocolError, RequestError, ServiceError, ServiceErrorDetail,
    TransportError,
};

// Re-export types
pub use types::{
    // Config
    ClientConfig, GrantType,
    // Token
    Token,
    // Endpoints
    MultiTenantOAuthConfig, OAuthConfig,
    // Environment
    Environment, ResourceIdentifiers,
    // Device
    DeviceCode, DeviceCodeResponse, DeviceFlowConfig,
};

// Re-export core components
pub use core::{
    // Transport
    Body, HttpMethod, HttpRequest, HttpResponse, MockSender, ReqwestSender, Sender,
    // Pipeline
    decorate_sender, respond, PrepareDecorator, Preparer, RespondDecorator, RetriableRequest,
    SendDecorator,
};

// Re-export resilience
pub use resilience::{send_with_retry, RetryPolicy};

// Re-export token management
pub use token::{
    MultiTenantServicePrincipalToken, OAuthTokenProvider, PopKey, RefreshCallback, Refresher,
    RsaPopKey, ServicePrincipalSecret, ServicePrincipalToken,
};
#[cfg(feature = "jwt")]
pub use token::CertificateSecret;

// Re-export flows
pub use flows::{DeviceAuthorizationFlow, DeviceAuthorizationFlowImpl};

// Re-export authorizers
pub use authorization::{
    with_bearer_challenge, ApiKeyAuthorizer, Authorizer, BasicAuthorizer, BearerAuthorizer,
    ChallengeCallback, EnvironmentSettings, FileSettings, MultiTenantBearerAuthorizer,
    NullAuthorizer, SasTokenAuthorizer,
};

// Re-export long-running operations
pub use lro::{poll_for_completion, send_with_registration, PollingConfig, PollingState};

// Re-export telemetry
pub use telemetry::{init_logging, LogFormat, LogLevel, LoggingConfig};

// Re-export validation and dates
pub use date::{Date, Rfc1123Time, Rfc3339Time, UnixTime};
pub use validation::{validate, Constraint, Validation};
