//! Authorizer Settings
//!
//! Builds authorizers from `AZURE_*` environment variables or from a
//! credentials file written by `az ad sp create-for-rbac --sdk-auth`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::authorization::{Authorizer, BearerAuthorizer};
use crate::error::{AzureResult, ConfigurationError};
use crate::token::cli::decode_with_bom;
use crate::token::{ServicePrincipalSecret, ServicePrincipalToken, MSI_ENDPOINT};
#[cfg(feature = "jwt")]
use crate::token::CertificateSecret;
use crate::types::{Environment, OAuthConfig};

pub const SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const TENANT_ID: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const CERTIFICATE_PATH: &str = "AZURE_CERTIFICATE_PATH";
pub const USERNAME: &str = "AZURE_USERNAME";
pub const PASSWORD: &str = "AZURE_PASSWORD";
pub const ENVIRONMENT_NAME: &str = "AZURE_ENVIRONMENT";
pub const RESOURCE: &str = "AZURE_AD_RESOURCE";

/// Path of the credentials file.
pub const AUTH_LOCATION: &str = "AZURE_AUTH_LOCATION";

const ENVIRONMENT_KEYS: &[&str] = &[
    SUBSCRIPTION_ID,
    TENANT_ID,
    CLIENT_ID,
    CLIENT_SECRET,
    CERTIFICATE_PATH,
    USERNAME,
    PASSWORD,
    ENVIRONMENT_NAME,
    RESOURCE,
];

/// Credential selected from the available settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    ClientSecret,
    Certificate,
    UsernamePassword,
    ManagedIdentity,
}

/// Settings read from the environment.
#[derive(Clone, Debug)]
pub struct EnvironmentSettings {
    values: HashMap<String, String>,
    environment: Environment,
}

/// Read every `AZURE_*` setting from the process environment.
pub fn get_settings_from_environment() -> AzureResult<EnvironmentSettings> {
    let values = ENVIRONMENT_KEYS
        .iter()
        .filter_map(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_string(), v))
        })
        .collect();
    EnvironmentSettings::from_values(values)
}

impl EnvironmentSettings {
    /// Build from explicit key/value pairs. The cloud defaults to public and
    /// the resource to its resource manager endpoint.
    pub fn from_values(mut values: HashMap<String, String>) -> AzureResult<Self> {
        let environment = match values.get(ENVIRONMENT_NAME) {
            Some(name) => Environment::from_name(name)?,
            None => Environment::public(),
        };
        values
            .entry(RESOURCE.to_string())
            .or_insert_with(|| environment.resource_manager_endpoint.clone());
        Ok(Self {
            values,
            environment,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn resource(&self) -> &str {
        self.get(RESOURCE).unwrap_or_default()
    }

    /// Credential to use, in priority order: client secret, certificate,
    /// username and password, managed identity.
    pub fn credential_kind(&self) -> CredentialKind {
        let has = |key: &str| self.get(key).is_some();
        if has(CLIENT_SECRET) {
            CredentialKind::ClientSecret
        } else if has(CERTIFICATE_PATH) {
            CredentialKind::Certificate
        } else if has(USERNAME) && has(PASSWORD) {
            CredentialKind::UsernamePassword
        } else {
            CredentialKind::ManagedIdentity
        }
    }

    fn required(&self, key: &str) -> AzureResult<&str> {
        self.get(key)
            .ok_or_else(|| ConfigurationError::empty(key).into())
    }

    fn oauth_config(&self) -> AzureResult<OAuthConfig> {
        OAuthConfig::new(
            &self.environment.active_directory_endpoint,
            self.required(TENANT_ID)?,
        )
    }

    /// Token holder for the selected credential.
    pub fn service_principal_token(&self) -> AzureResult<ServicePrincipalToken> {
        let kind = self.credential_kind();
        debug!(kind = ?kind, environment = %self.environment.name, "Building token from environment");
        match kind {
            CredentialKind::ClientSecret => ServicePrincipalToken::from_secret(
                self.oauth_config()?,
                self.required(CLIENT_ID)?,
                self.required(CLIENT_SECRET)?,
                self.resource(),
            ),
            CredentialKind::Certificate => self.certificate_token(),
            CredentialKind::UsernamePassword => ServicePrincipalToken::from_username_password(
                self.oauth_config()?,
                self.required(CLIENT_ID)?,
                self.required(USERNAME)?,
                self.required(PASSWORD)?,
                self.resource(),
            ),
            CredentialKind::ManagedIdentity => match self.get(CLIENT_ID) {
                Some(client_id) => ServicePrincipalToken::from_msi_with_user_assigned_id(
                    MSI_ENDPOINT,
                    self.resource(),
                    client_id,
                ),
                None => ServicePrincipalToken::from_msi(MSI_ENDPOINT, self.resource()),
            },
        }
    }

    #[cfg(feature = "jwt")]
    fn certificate_token(&self) -> AzureResult<ServicePrincipalToken> {
        let certificate = CertificateSecret::from_pem_file(self.required(CERTIFICATE_PATH)?)?;
        ServicePrincipalToken::from_certificate(
            self.oauth_config()?,
            self.required(CLIENT_ID)?,
            certificate,
            self.resource(),
        )
    }

    #[cfg(not(feature = "jwt"))]
    fn certificate_token(&self) -> AzureResult<ServicePrincipalToken> {
        Err(ConfigurationError::invalid(
            CERTIFICATE_PATH,
            "certificate credentials need the `jwt` feature",
        )
        .into())
    }

    /// Bearer authorizer for the selected credential.
    pub fn get_authorizer(&self) -> AzureResult<Arc<dyn Authorizer>> {
        Ok(Arc::new(BearerAuthorizer::new(Arc::new(
            self.service_principal_token()?,
        ))))
    }
}

/// Contents of a credentials file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub active_directory_endpoint_url: String,
    #[serde(default)]
    pub resource_manager_endpoint_url: String,
    #[serde(default)]
    pub active_directory_graph_resource_id: String,
    #[serde(default)]
    pub sql_management_endpoint_url: String,
    #[serde(default)]
    pub gallery_endpoint_url: String,
    #[serde(default)]
    pub management_endpoint_url: String,
}

/// Load the credentials file named by `AZURE_AUTH_LOCATION`.
pub fn get_settings_from_file() -> AzureResult<FileSettings> {
    let path = std::env::var(AUTH_LOCATION).map_err(|_| ConfigurationError::empty(AUTH_LOCATION))?;
    FileSettings::from_file(path)
}

impl FileSettings {
    pub fn from_file(path: impl AsRef<Path>) -> AzureResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ConfigurationError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_str(&decode_with_bom(&bytes)?)?)
    }

    /// Resource to request a token for when calling `base_uri`: the first
    /// configured endpoint that `base_uri` matches, or `base_uri` itself.
    pub fn resource_for(&self, base_uri: &str) -> String {
        let normalize = |s: &str| s.trim_end_matches('/').to_ascii_lowercase();
        let wanted = normalize(base_uri);
        [
            &self.resource_manager_endpoint_url,
            &self.active_directory_graph_resource_id,
            &self.sql_management_endpoint_url,
            &self.gallery_endpoint_url,
            &self.management_endpoint_url,
        ]
        .into_iter()
        .find(|endpoint| !endpoint.is_empty() && normalize(endpoint) == wanted)
        .cloned()
        .unwrap_or_else(|| base_uri.to_string())
    }

    /// Client-credentials token holder for `resource`.
    pub fn service_principal_token(&self, resource: &str) -> AzureResult<ServicePrincipalToken> {
        let config = OAuthConfig::new(&self.active_directory_endpoint_url, &self.tenant_id)?;
        ServicePrincipalToken::new(
            config,
            self.client_id.clone(),
            resource,
            ServicePrincipalSecret::client_secret(self.client_secret.clone()),
        )
    }

    /// Client-credentials bearer authorizer for `resource`.
    pub fn client_credentials_authorizer(&self, resource: &str) -> AzureResult<Arc<dyn Authorizer>> {
        if self.client_secret.is_empty() {
            return Err(ConfigurationError::empty("clientSecret").into());
        }
        Ok(Arc::new(BearerAuthorizer::new(Arc::new(
            self.service_principal_token(resource)?,
        ))))
    }
}
