//! Cloud Environments
//!
//! Endpoint sets for the public and sovereign clouds.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AzureResult, ConfigurationError};

/// Marks an endpoint the cloud does not offer.
pub const NOT_AVAILABLE: &str = "N/A";

/// Environment variable naming a JSON file with a custom environment.
pub const ENVIRONMENT_FILEPATH_VAR: &str = "AZURE_ENVIRONMENT_FILEPATH";

/// Resource identifiers used as token audiences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifiers {
    pub graph: String,
    pub key_vault: String,
    pub datalake: String,
    pub batch: String,
    pub operational_insights: String,
    pub storage: String,
}

/// Endpoints of one cloud.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(rename = "managementPortalURL")]
    pub management_portal_url: String,
    #[serde(rename = "publishSettingsURL")]
    pub publish_settings_url: String,
    pub service_management_endpoint: String,
    pub resource_manager_endpoint: String,
    pub active_directory_endpoint: String,
    pub gallery_endpoint: String,
    pub key_vault_endpoint: String,
    pub graph_endpoint: String,
    pub service_bus_endpoint: String,
    pub batch_management_endpoint: String,
    pub storage_endpoint_suffix: String,
    #[serde(rename = "sqlDatabaseDNSSuffix")]
    pub sql_database_dns_suffix: String,
    #[serde(rename = "trafficManagerDNSSuffix")]
    pub traffic_manager_dns_suffix: String,
    #[serde(rename = "keyVaultDNSSuffix")]
    pub key_vault_dns_suffix: String,
    pub service_bus_endpoint_suffix: String,
    #[serde(rename = "serviceManagementVMDNSSuffix")]
    pub service_management_vm_dns_suffix: String,
    #[serde(rename = "resourceManagerVMDNSSuffix")]
    pub resource_manager_vm_dns_suffix: String,
    #[serde(rename = "containerRegistryDNSSuffix")]
    pub container_registry_dns_suffix: String,
    pub token_audience: String,
    pub resource_identifiers: ResourceIdentifiers,
}

fn resource_identifiers(
    graph: &str,
    key_vault: &str,
    datalake: &str,
    batch: &str,
    operational_insights: &str,
) -> ResourceIdentifiers {
    ResourceIdentifiers {
        graph: graph.into(),
        key_vault: key_vault.into(),
        datalake: datalake.into(),
        batch: batch.into(),
        operational_insights: operational_insights.into(),
        storage: "https://storage.azure.com/".into(),
    }
}

impl Environment {
    /// The public cloud.
    pub fn public() -> Self {
        Self {
            name: "AzurePublicCloud".into(),
            management_portal_url: "https://manage.windowsazure.com/".into(),
            publish_settings_url: "https://manage.windowsazure.com/publishsettings/index".into(),
            service_management_endpoint: "https://management.core.windows.net/".into(),
            resource_manager_endpoint: "https://management.azure.com/".into(),
            active_directory_endpoint: "https://login.microsoftonline.com/".into(),
            gallery_endpoint: "https://gallery.azure.com/".into(),
            key_vault_endpoint: "https://vault.azure.net/".into(),
            graph_endpoint: "https://graph.windows.net/".into(),
            service_bus_endpoint: "https://servicebus.windows.net/".into(),
            batch_management_endpoint: "https://batch.core.windows.net/".into(),
            storage_endpoint_suffix: "core.windows.net".into(),
            sql_database_dns_suffix: "database.windows.net".into(),
            traffic_manager_dns_suffix: "trafficmanager.net".into(),
            key_vault_dns_suffix: "vault.azure.net".into(),
            service_bus_endpoint_suffix: "servicebus.windows.net".into(),
            service_management_vm_dns_suffix: "cloudapp.net".into(),
            resource_manager_vm_dns_suffix: "cloudapp.azure.com".into(),
            container_registry_dns_suffix: "azurecr.io".into(),
            token_audience: "https://management.azure.com/".into(),
            resource_identifiers: resource_identifiers(
                "https://graph.windows.net/",
                "https://vault.azure.net",
                "https://datalake.azure.net/",
                "https://batch.core.windows.net/",
                "https://api.loganalytics.io",
            ),
        }
    }

    /// The China cloud.
    pub fn china() -> Self {
        Self {
            name: "AzureChinaCloud".into(),
            management_portal_url: "https://manage.chinacloudapi.com/".into(),
            publish_settings_url: "https://manage.chinacloudapi.com/publishsettings/index".into(),
            service_management_endpoint: "https://management.core.chinacloudapi.cn/".into(),
            resource_manager_endpoint: "https://management.chinacloudapi.cn/".into(),
            active_directory_endpoint: "https://login.chinacloudapi.cn/".into(),
            gallery_endpoint: "https://gallery.chinacloudapi.cn/".into(),
            key_vault_endpoint: "https://vault.azure.cn/".into(),
            graph_endpoint: "https://graph.chinacloudapi.cn/".into(),
            service_bus_endpoint: "https://servicebus.chinacloudapi.cn/".into(),
            batch_management_endpoint: "https://batch.chinacloudapi.cn/".into(),
            storage_endpoint_suffix: "core.chinacloudapi.cn".into(),
            sql_database_dns_suffix: "database.chinacloudapi.cn".into(),
            traffic_manager_dns_suffix: "trafficmanager.cn".into(),
            key_vault_dns_suffix: "vault.azure.cn".into(),
            service_bus_endpoint_suffix: "servicebus.chinacloudapi.cn".into(),
            service_management_vm_dns_suffix: "chinacloudapp.cn".into(),
            resource_manager_vm_dns_suffix: "cloudapp.chinacloudapi.cn".into(),
            container_registry_dns_suffix: "azurecr.cn".into(),
            token_audience: "https://management.chinacloudapi.cn/".into(),
            resource_identifiers: resource_identifiers(
                "https://graph.chinacloudapi.cn/",
                "https://vault.azure.cn",
                NOT_AVAILABLE,
                "https://batch.chinacloudapi.cn/",
                NOT_AVAILABLE,
            ),
        }
    }

    /// The US Government cloud.
    pub fn us_government() -> Self {
        Self {
            name: "AzureUSGovernmentCloud".into(),
            management_portal_url: "https://manage.windowsazure.us/".into(),
            publish_settings_url: "https://manage.windowsazure.us/publishsettings/index".into(),
            service_management_endpoint: "https://management.core.usgovcloudapi.net/".into(),
            resource_manager_endpoint: "https://management.usgovcloudapi.net/".into(),
            active_directory_endpoint: "https://login.microsoftonline.us/".into(),
            gallery_endpoint: "https://gallery.usgovcloudapi.net/".into(),
            key_vault_endpoint: "https://vault.usgovcloudapi.net/".into(),
            graph_endpoint: "https://graph.windows.net/".into(),
            service_bus_endpoint: "https://servicebus.usgovcloudapi.net/".into(),
            batch_management_endpoint: "https://batch.core.usgovcloudapi.net/".into(),
            storage_endpoint_suffix: "core.usgovcloudapi.net".into(),
            sql_database_dns_suffix: "database.usgovcloudapi.net".into(),
            traffic_manager_dns_suffix: "usgovtrafficmanager.net".into(),
            key_vault_dns_suffix: "vault.usgovcloudapi.net".into(),
            service_bus_endpoint_suffix: "servicebus.usgovcloudapi.net".into(),
            service_management_vm_dns_suffix: "usgovcloudapp.net".into(),
            resource_manager_vm_dns_suffix: "cloudapp.usgovcloudapi.net".into(),
            container_registry_dns_suffix: "azurecr.us".into(),
            token_audience: "https://management.usgovcloudapi.net/".into(),
            resource_identifiers: resource_identifiers(
                "https://graph.windows.net/",
                "https://vault.usgovcloudapi.net",
                NOT_AVAILABLE,
                "https://batch.core.usgovcloudapi.net/",
                "https://api.loganalytics.us",
            ),
        }
    }

    /// The German cloud.
    pub fn german() -> Self {
        Self {
            name: "AzureGermanCloud".into(),
            management_portal_url: "http://portal.microsoftazure.de/".into(),
            publish_settings_url: "https://manage.microsoftazure.de/publishsettings/index".into(),
            service_management_endpoint: "https://management.core.cloudapi.de/".into(),
            resource_manager_endpoint: "https://management.microsoftazure.de/".into(),
            active_directory_endpoint: "https://login.microsoftonline.de/".into(),
            gallery_endpoint: "https://gallery.cloudapi.de/".into(),
            key_vault_endpoint: "https://vault.microsoftazure.de/".into(),
            graph_endpoint: "https://graph.cloudapi.de/".into(),
            service_bus_endpoint: "https://servicebus.cloudapi.de/".into(),
            batch_management_endpoint: "https://batch.cloudapi.de/".into(),
            storage_endpoint_suffix: "core.cloudapi.de".into(),
            sql_database_dns_suffix: "database.cloudapi.de".into(),
            traffic_manager_dns_suffix: "azuretrafficmanager.de".into(),
            key_vault_dns_suffix: "vault.microsoftazure.de".into(),
            service_bus_endpoint_suffix: "servicebus.cloudapi.de".into(),
            service_management_vm_dns_suffix: "azurecloudapp.de".into(),
            resource_manager_vm_dns_suffix: "cloudapp.microsoftazure.de".into(),
            container_registry_dns_suffix: NOT_AVAILABLE.into(),
            token_audience: "https://management.microsoftazure.de/".into(),
            resource_identifiers: resource_identifiers(
                "https://graph.cloudapi.de/",
                "https://vault.microsoftazure.de",
                NOT_AVAILABLE,
                "https://batch.cloudapi.de/",
                NOT_AVAILABLE,
            ),
        }
    }

    /// Look up a built-in environment by name, case-insensitively.
    ///
    /// `AZURESTACKCLOUD` loads the file named by `AZURE_ENVIRONMENT_FILEPATH`.
    pub fn from_name(name: &str) -> AzureResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AZURECHINACLOUD" => Ok(Self::china()),
            "AZUREGERMANCLOUD" => Ok(Self::german()),
            "AZURECLOUD" | "AZUREPUBLICCLOUD" => Ok(Self::public()),
            "AZUREUSGOVERNMENT" | "AZUREUSGOVERNMENTCLOUD" => Ok(Self::us_government()),
            "AZURESTACKCLOUD" => {
                let path = std::env::var(ENVIRONMENT_FILEPATH_VAR)
                    .map_err(|_| ConfigurationError::empty(ENVIRONMENT_FILEPATH_VAR))?;
                Self::from_file(path)
            }
            _ => Err(ConfigurationError::UnknownEnvironment {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Load a custom environment from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> AzureResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|e| ConfigurationError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::public()
    }
}
