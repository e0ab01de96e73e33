//! OAuth Endpoints
//!
//! Authorize, token and device-code endpoints derived from a directory URL
//! and a tenant.

use url::Url;

use crate::error::{AzureResult, ConfigurationError};

const ACTIVE_DIRECTORY_API_VERSION: &str = "1.0";

/// Endpoint triple for one tenant. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthConfig {
    pub authority_endpoint: Url,
    pub authorize_endpoint: Url,
    pub token_endpoint: Url,
    pub device_code_endpoint: Url,
}

fn parse_authority(active_directory_endpoint: &str) -> AzureResult<Url> {
    let mut authority = Url::parse(active_directory_endpoint).map_err(|e| {
        ConfigurationError::InvalidUrl {
            url: active_directory_endpoint.to_string(),
            message: e.to_string(),
        }
    })?;
    if authority.cannot_be_a_base() {
        return Err(ConfigurationError::InvalidUrl {
            url: active_directory_endpoint.to_string(),
            message: "directory URL cannot be a base".to_string(),
        }
        .into());
    }
    if !authority.path().ends_with('/') {
        let path = format!("{}/", authority.path());
        authority.set_path(&path);
    }
    Ok(authority)
}

fn endpoint(authority: &Url, tenant_id: &str, name: &str) -> AzureResult<Url> {
    authority
        .join(&format!(
            "{}/oauth2/{}?api-version={}",
            tenant_id, name, ACTIVE_DIRECTORY_API_VERSION
        ))
        .map_err(|e| {
            ConfigurationError::InvalidUrl {
                url: authority.to_string(),
                message: e.to_string(),
            }
            .into()
        })
}

impl OAuthConfig {
    /// Resolve endpoints for `tenant_id` under `active_directory_endpoint`.
    pub fn new(active_directory_endpoint: &str, tenant_id: &str) -> AzureResult<Self> {
        if tenant_id.trim().is_empty() {
            return Err(ConfigurationError::empty("tenant_id").into());
        }
        let authority = parse_authority(active_directory_endpoint)?;
        Ok(Self {
            authorize_endpoint: endpoint(&authority, tenant_id, "authorize")?,
            token_endpoint: endpoint(&authority, tenant_id, "token")?,
            device_code_endpoint: endpoint(&authority, tenant_id, "devicecode")?,
            authority_endpoint: authority,
        })
    }

    /// Endpoints for an identity service reached through a single token URL,
    /// such as the instance metadata service.
    pub fn from_token_endpoint(token_endpoint: &str) -> AzureResult<Self> {
        let url = Url::parse(token_endpoint).map_err(|e| ConfigurationError::InvalidUrl {
            url: token_endpoint.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            authority_endpoint: url.clone(),
            authorize_endpoint: url.clone(),
            token_endpoint: url.clone(),
            device_code_endpoint: url,
        })
    }
}

/// Endpoints for a primary tenant plus auxiliary tenants used for
/// cross-tenant authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiTenantOAuthConfig {
    primary: OAuthConfig,
    auxiliary: Vec<OAuthConfig>,
}

/// Maximum number of auxiliary tenants accepted by resource manager.
pub const MAX_AUXILIARY_TENANTS: usize = 3;

impl MultiTenantOAuthConfig {
    pub fn new(
        active_directory_endpoint: &str,
        primary_tenant_id: &str,
        auxiliary_tenant_ids: &[&str],
    ) -> AzureResult<Self> {
        if auxiliary_tenant_ids.len() > MAX_AUXILIARY_TENANTS {
            return Err(ConfigurationError::invalid(
                "auxiliary_tenant_ids",
                format!(
                    "must specify at most {} auxiliary tenants",
                    MAX_AUXILIARY_TENANTS
                ),
            )
            .into());
        }
        let primary = OAuthConfig::new(active_directory_endpoint, primary_tenant_id)?;
        let auxiliary = auxiliary_tenant_ids
            .iter()
            .map(|tenant| OAuthConfig::new(active_directory_endpoint, tenant))
            .collect::<AzureResult<Vec<_>>>()?;
        Ok(Self { primary, auxiliary })
    }

    pub fn primary_tenant(&self) -> &OAuthConfig {
        &self.primary
    }

    pub fn auxiliary_tenants(&self) -> &[OAuthConfig] {
        &self.auxiliary
    }
}
