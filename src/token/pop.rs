//! Proof-of-Possession
//!
//! Signs access tokens into PoP tokens bound to a request host.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::rsa::PublicKeyComponents;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde_json::json;
use std::fmt;

use crate::error::{AuthenticationError, AzureResult, ConfigurationError};
use crate::token::secret::{find_pem, parse_pem};

/// Token type sent in the authorization header for PoP tokens.
pub const POP_AUTHORIZATION_SCHEME: &str = "PoP";

/// Signing key bound to PoP tokens.
pub trait PopKey: Send + Sync {
    /// Key id (JWK thumbprint).
    fn kid(&self) -> &str;

    /// JWS algorithm name.
    fn alg(&self) -> &'static str;

    /// Public key as a JWK.
    fn jwk(&self) -> serde_json::Value;

    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> AzureResult<Vec<u8>>;
}

/// RSA PoP key (RS256).
pub struct RsaPopKey {
    key_pair: RsaKeyPair,
    n: String,
    e: String,
    kid: String,
    rng: SystemRandom,
}

impl RsaPopKey {
    /// Load from a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> AzureResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .map_err(|e| ConfigurationError::invalid("pop_key", e.to_string()))?;
        let components: PublicKeyComponents<Vec<u8>> = key_pair.public().into();
        let n = URL_SAFE_NO_PAD.encode(&components.n);
        let e = URL_SAFE_NO_PAD.encode(&components.e);

        // RFC 7638 thumbprint over the required members in lexicographic order.
        let thumbprint_input = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n);
        let digest = ring::digest::digest(&ring::digest::SHA256, thumbprint_input.as_bytes());
        let kid = URL_SAFE_NO_PAD.encode(digest.as_ref());

        Ok(Self {
            key_pair,
            n,
            e,
            kid,
            rng: SystemRandom::new(),
        })
    }

    /// Load from a `BEGIN PRIVATE KEY` PEM block.
    pub fn from_pkcs8_pem(pem: &str) -> AzureResult<Self> {
        let blocks = parse_pem(pem)?;
        Self::from_pkcs8_der(find_pem(&blocks, &["PRIVATE KEY"])?.contents())
    }
}

impl PopKey for RsaPopKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn alg(&self) -> &'static str {
        "RS256"
    }

    fn jwk(&self) -> serde_json::Value {
        json!({
            "e": self.e,
            "kty": "RSA",
            "n": self.n,
            "alg": self.alg(),
            "kid": self.kid,
        })
    }

    fn sign(&self, message: &[u8]) -> AzureResult<Vec<u8>> {
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
            .map_err(|_| AuthenticationError::new("failed to sign PoP token"))?;
        Ok(signature)
    }
}

impl fmt::Debug for RsaPopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPopKey")
            .field("kid", &self.kid)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Wrap `access_token` into a PoP token for requests to `host`, issued at `ts`.
pub fn pop_token(
    access_token: &str,
    key: &dyn PopKey,
    host: &str,
    ts: i64,
) -> AzureResult<String> {
    let header = json!({
        "typ": "pop",
        "alg": key.alg(),
        "kid": key.kid(),
    });
    let payload = json!({
        "at": access_token,
        "ts": ts,
        "u": host,
        "cnf": { "jwk": key.jwk() },
        "nonce": uuid::Uuid::new_v4().simple().to_string(),
    });

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?)
    );
    let signature = key.sign(signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}
