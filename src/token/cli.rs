//! CLI Credentials
//!
//! Tokens and subscriptions cached by the command-line tools under
//! `~/.azure`.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{AzureResult, ConfigurationError, ProtocolError};
use crate::types::token::Token;

/// Overrides the location of `accessTokens.json`.
pub const ACCESS_TOKENS_PATH_ENV: &str = "AZURE_ACCESS_TOKEN_FILE";

/// Overrides the CLI configuration directory.
pub const CONFIG_DIR_ENV: &str = "AZURE_CONFIG_DIR";

const LOCAL_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One cached CLI token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub expires_on: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, rename = "isMRRT")]
    pub is_mrrt: bool,
    #[serde(default, rename = "_clientId")]
    pub client_id: String,
    #[serde(default, rename = "_authority")]
    pub authority: String,
}

impl CliToken {
    /// Expiry instant. `expiresOn` is RFC 3339 or a local timestamp.
    pub fn expires_at(&self) -> AzureResult<DateTime<Local>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(&self.expires_on) {
            return Ok(at.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(&self.expires_on, LOCAL_EXPIRY_FORMAT)
            .map_err(|e| ProtocolError::InvalidResponse {
                message: format!("invalid expiresOn '{}': {}", self.expires_on, e),
            })?;
        Local.from_local_datetime(&naive).earliest().ok_or_else(|| {
            ProtocolError::InvalidResponse {
                message: format!("expiresOn '{}' does not exist in local time", self.expires_on),
            }
            .into()
        })
    }

    /// Convert into a refreshable token.
    pub fn to_token(&self) -> AzureResult<Token> {
        let expires_on = self.expires_at()?.timestamp();
        Ok(Token {
            access_token: self.access_token.clone(),
            refresh_token: Some(self.refresh_token.clone()).filter(|r| !r.is_empty()),
            expires_in: Some(self.expires_in),
            expires_on: Some(expires_on),
            not_before: Some(expires_on),
            resource: self.resource.clone(),
            token_type: self.token_type.clone(),
            pop_key: None,
        })
    }
}

/// Subscription recorded in `azureProfile.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliSubscription {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub environment_name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user: Option<CliUser>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CliUser {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub user_type: String,
}

/// Contents of `azureProfile.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliProfile {
    #[serde(default)]
    pub installation_id: String,
    #[serde(default)]
    pub subscriptions: Vec<CliSubscription>,
}

impl CliProfile {
    pub fn default_subscription(&self) -> Option<&CliSubscription> {
        self.subscriptions.iter().find(|s| s.is_default)
    }

    pub fn subscription(&self, id: &str) -> Option<&CliSubscription> {
        self.subscriptions
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
    }
}

/// Decode file contents, dropping a UTF-8, UTF-16LE or UTF-16BE byte order mark.
pub fn decode_with_bom(bytes: &[u8]) -> AzureResult<String> {
    let utf16 = |data: &[u8], little: bool| -> AzureResult<String> {
        let chunks = data.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            return Err(ProtocolError::InvalidResponse {
                message: "invalid UTF-16 content: odd number of bytes".to_string(),
            }
            .into());
        }
        let units: Vec<u16> = chunks
            .map(|c| if little { u16::from_le_bytes([c[0], c[1]]) } else { u16::from_be_bytes([c[0], c[1]]) })
            .collect();
        String::from_utf16(&units).map_err(|e| {
            ProtocolError::InvalidResponse {
                message: format!("invalid UTF-16 content: {}", e),
            }
            .into()
        })
    };

    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => utf8(rest),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, true),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, false),
        _ => utf8(bytes),
    }
}

fn utf8(bytes: &[u8]) -> AzureResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        ProtocolError::InvalidResponse {
            message: format!("invalid UTF-8 content: {}", e),
        }
        .into()
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AzureResult<T> {
    let bytes = std::fs::read(path).map_err(|e| ConfigurationError::FileRead {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let text = decode_with_bom(&bytes)?;
    serde_json::from_str(&text).map_err(|e| {
        ProtocolError::InvalidJson {
            message: format!("{}: {}", path.display(), e),
        }
        .into()
    })
}

/// CLI configuration directory.
pub fn config_dir() -> Option<PathBuf> {
    resolve_config_dir(std::env::var_os(CONFIG_DIR_ENV))
}

fn resolve_config_dir(explicit: Option<OsString>) -> Option<PathBuf> {
    match explicit {
        Some(dir) => Some(PathBuf::from(dir)),
        None => dirs::home_dir().map(|home| home.join(".azure")),
    }
}

/// Location of `accessTokens.json`.
pub fn access_tokens_path() -> Option<PathBuf> {
    match std::env::var_os(ACCESS_TOKENS_PATH_ENV) {
        Some(path) => Some(PathBuf::from(path)),
        None => config_dir().map(|d| d.join("accessTokens.json")),
    }
}

/// Location of `azureProfile.json`.
pub fn profile_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("azureProfile.json"))
}

/// Load every cached token from `path`.
pub fn load_tokens(path: impl AsRef<Path>) -> AzureResult<Vec<CliToken>> {
    read_json(path.as_ref())
}

/// Load the CLI profile from `path`.
pub fn load_profile(path: impl AsRef<Path>) -> AzureResult<CliProfile> {
    read_json(path.as_ref())
}

/// Most recent cached token for `resource`.
pub fn token_for_resource(tokens: &[CliToken], resource: &str) -> Option<CliToken> {
    let wanted = resource.trim_end_matches('/');
    tokens
        .iter()
        .filter(|t| t.resource.trim_end_matches('/').eq_ignore_ascii_case(wanted))
        .max_by_key(|t| t.expires_at().map(|d| d.timestamp()).unwrap_or(i64::MIN))
        .cloned()
}
