//! Service Principal Secrets
//!
//! Credential material and the form fields each kind contributes to a token
//! request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::error::{AzureResult, ConfigurationError};
use crate::types::config::GrantType;

#[cfg(feature = "jwt")]
use crate::error::AuthenticationError;
#[cfg(feature = "jwt")]
use jsonwebtoken::{Algorithm, EncodingKey, Header};
#[cfg(feature = "jwt")]
use serde::Serialize;

/// `client_assertion_type` for JWT bearer assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a client assertion.
pub const ASSERTION_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Tags accepted for RSA private keys.
pub(crate) const PRIVATE_KEY_TAGS: [&str; 2] = ["PRIVATE KEY", "RSA PRIVATE KEY"];

/// Parse every PEM block in `content`.
pub(crate) fn parse_pem(content: &str) -> AzureResult<Vec<pem::Pem>> {
    pem::parse_many(content).map_err(|e| ConfigurationError::invalid("pem", e.to_string()).into())
}

/// The first block tagged with one of `tags`. Encrypted blocks are rejected.
pub(crate) fn find_pem<'a>(blocks: &'a [pem::Pem], tags: &[&str]) -> AzureResult<&'a pem::Pem> {
    let block = blocks
        .iter()
        .find(|block| tags.contains(&block.tag()))
        .ok_or_else(|| ConfigurationError::invalid("pem", format!("no '{}' block found", tags[0])))?;
    if block.headers().get("Proc-Type").is_some() {
        return Err(ConfigurationError::invalid(
            "pem",
            format!("encrypted '{}' blocks are not supported", block.tag()),
        )
        .into());
    }
    Ok(block)
}

/// Certificate and private key used to sign client assertions.
#[cfg(feature = "jwt")]
#[derive(Clone)]
pub struct CertificateSecret {
    thumbprint: String,
    key: EncodingKey,
}

#[cfg(feature = "jwt")]
#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    exp: i64,
}

#[cfg(feature = "jwt")]
impl CertificateSecret {
    /// Build from a PEM certificate and a PEM RSA private key (PKCS#1 or PKCS#8).
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> AzureResult<Self> {
        let certificates = parse_pem(certificate_pem)?;
        let keys = parse_pem(private_key_pem)?;
        Self::from_blocks(
            find_pem(&certificates, &["CERTIFICATE"])?,
            find_pem(&keys, &PRIVATE_KEY_TAGS)?,
        )
    }

    /// Load both PEM blocks from one file, as written by `openssl pkcs12 -nodes`.
    pub fn from_pem_file(path: impl AsRef<std::path::Path>) -> AzureResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let blocks = parse_pem(&content)?;
        Self::from_blocks(
            find_pem(&blocks, &["CERTIFICATE"])?,
            find_pem(&blocks, &PRIVATE_KEY_TAGS)?,
        )
    }

    fn from_blocks(certificate: &pem::Pem, private_key: &pem::Pem) -> AzureResult<Self> {
        let key = EncodingKey::from_rsa_pem(pem::encode(private_key).as_bytes())
            .map_err(|e| ConfigurationError::invalid("private_key", e.to_string()))?;
        Ok(Self {
            thumbprint: Self::thumbprint_of(certificate.contents()),
            key,
        })
    }

    /// base64url SHA-1 of the certificate DER (`x5t`).
    pub fn thumbprint_of(certificate_der: &[u8]) -> String {
        let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, certificate_der);
        URL_SAFE_NO_PAD.encode(digest.as_ref())
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Signed RS256 assertion for `client_id` against `audience`, valid from `now`.
    pub fn sign_assertion(&self, client_id: &str, audience: &str, now: i64) -> AzureResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.x5t = Some(self.thumbprint.clone());

        let jti: [u8; 20] = rand::random();
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: URL_SAFE_NO_PAD.encode(jti),
            nbf: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.key).map_err(|e| {
            AuthenticationError::new(format!("failed to sign client assertion: {}", e)).into()
        })
    }
}

#[cfg(feature = "jwt")]
impl fmt::Debug for CertificateSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateSecret")
            .field("thumbprint", &self.thumbprint)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Credential material held by a service-principal token.
#[derive(Clone)]
pub enum ServicePrincipalSecret {
    /// Shared client secret.
    ClientSecret(SecretString),
    /// Certificate-signed JWT assertion.
    #[cfg(feature = "jwt")]
    Certificate(CertificateSecret),
    /// Resource owner password.
    UsernamePassword {
        username: String,
        password: SecretString,
    },
    /// Authorization code redeemed by a web app.
    AuthorizationCode {
        code: SecretString,
        client_secret: SecretString,
        redirect_uri: String,
    },
    /// Managed identity, optionally user assigned.
    ManagedIdentity { client_id: Option<String> },
    /// No material: refresh only through a refresh token.
    None,
}

impl ServicePrincipalSecret {
    pub fn client_secret(secret: impl Into<String>) -> Self {
        Self::ClientSecret(SecretString::new(secret.into()))
    }

    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UsernamePassword {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn authorization_code(
        code: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self::AuthorizationCode {
            code: SecretString::new(code.into()),
            client_secret: SecretString::new(client_secret.into()),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Grant type used when no refresh token is held. `None` for secrets
    /// that cannot mint a token through the form flow.
    pub fn grant_type(&self) -> Option<GrantType> {
        match self {
            Self::ClientSecret(_) => Some(GrantType::ClientCredentials),
            #[cfg(feature = "jwt")]
            Self::Certificate(_) => Some(GrantType::ClientCredentials),
            Self::UsernamePassword { .. } => Some(GrantType::Password),
            Self::AuthorizationCode { .. } => Some(GrantType::AuthorizationCode),
            Self::ManagedIdentity { .. } | Self::None => None,
        }
    }

    pub fn is_managed_identity(&self) -> bool {
        matches!(self, Self::ManagedIdentity { .. })
    }

    /// Form fields proving the client's identity to `token_endpoint`.
    #[cfg_attr(not(feature = "jwt"), allow(unused_variables))]
    pub fn authentication_values(
        &self,
        client_id: &str,
        token_endpoint: &str,
        now: i64,
    ) -> AzureResult<Vec<(String, String)>> {
        let values = match self {
            Self::ClientSecret(secret) => {
                vec![("client_secret".to_string(), secret.expose_secret().clone())]
            }
            #[cfg(feature = "jwt")]
            Self::Certificate(certificate) => vec![
                (
                    "client_assertion".to_string(),
                    certificate.sign_assertion(client_id, token_endpoint, now)?,
                ),
                (
                    "client_assertion_type".to_string(),
                    JWT_BEARER_ASSERTION_TYPE.to_string(),
                ),
            ],
            Self::UsernamePassword { username, password } => vec![
                ("username".to_string(), username.clone()),
                ("password".to_string(), password.expose_secret().clone()),
            ],
            Self::AuthorizationCode {
                code,
                client_secret,
                redirect_uri,
            } => vec![
                ("code".to_string(), code.expose_secret().clone()),
                (
                    "client_secret".to_string(),
                    client_secret.expose_secret().clone(),
                ),
                ("redirect_uri".to_string(), redirect_uri.clone()),
            ],
            Self::ManagedIdentity { .. } => Vec::new(),
            Self::None => {
                return Err(ConfigurationError::invalid(
                    "secret",
                    "manually created token holds no secret material to retrieve a new access token",
                )
                .into())
            }
        };
        Ok(values)
    }
}

impl fmt::Debug for ServicePrincipalSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret(_) => f.write_str("ClientSecret([REDACTED])"),
            #[cfg(feature = "jwt")]
            Self::Certificate(c) => f.debug_tuple("Certificate").field(c).finish(),
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::AuthorizationCode { redirect_uri, .. } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"[REDACTED]")
                .field("client_secret", &"[REDACTED]")
                .field("redirect_uri", redirect_uri)
                .finish(),
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            Self::None => f.write_str("None"),
        }
    }
}
