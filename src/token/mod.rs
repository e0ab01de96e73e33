//! Token Management
//!
//! Token holders and the credential material behind them.
//!
//! This module provides:
//!
//! - **Service Principal Token**: refreshable token holder with a single in-flight refresh
//! - **Secrets**: client secret, certificate assertion, password, authorization code, managed identity
//! - **Proof-of-Possession**: PoP token signing
//! - **CLI Credentials**: tokens and subscriptions cached by the command-line tools

pub mod cli;
pub mod msi;
pub mod pop;
pub mod provider;
pub mod secret;
pub mod service_principal;

// Token Providers
pub use provider::{OAuthTokenProvider, Refresher};

// Service Principal Token
pub use service_principal::{
    MultiTenantServicePrincipalToken, RefreshCallback, ServicePrincipalToken,
};

// Secrets
#[cfg(feature = "jwt")]
pub use secret::CertificateSecret;
pub use secret::{ServicePrincipalSecret, JWT_BEARER_ASSERTION_TYPE};

// Proof-of-Possession
pub use pop::{pop_token, PopKey, RsaPopKey, POP_AUTHORIZATION_SCHEME};

// Managed Identity
pub use msi::{MSI_API_VERSION, MSI_ENDPOINT};
