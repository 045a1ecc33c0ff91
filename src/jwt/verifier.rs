//! Token validation.
//!
//! Checks run cheapest-first: structure, then claims, then key resolution
//! (possibly a network fetch), then the signature itself. A malformed or
//! plainly invalid token never pays for a key set fetch.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::jwks::{KeySetCache, KeySetError};
use super::key::jwk_to_pem;
use crate::clock::Clock;

/// Token header fields relevant to verification.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    kid: Option<String>,
    #[allow(dead_code)]
    alg: Option<String>,
}

/// Audience can be absent, a single string, or an array of strings.
/// Identity tokens carry a single client-bound value; anything else fails
/// the audience check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// True only for a single audience equal to the expected client id.
    pub fn equals(&self, expected: &str) -> bool {
        matches!(self, Audience::Single(s) if s == expected)
    }
}

/// Verified token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: Option<String>,
    /// Issuer.
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Audience,
    /// Expiration time, epoch seconds.
    pub exp: Option<i64>,
    /// Issued at, epoch seconds.
    pub iat: Option<i64>,
    /// Token purpose: "id" or "access".
    pub token_use: Option<String>,
    /// Email, when the identity token carries one.
    pub email: Option<String>,
    /// Remaining claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Why a token was rejected. Never partially valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyReason {
    #[error("invalid token format")]
    Malformed,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid token_use")]
    InvalidTokenUse,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("token expired")]
    Expired,
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error(transparent)]
    KeySet(#[from] KeySetError),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("invalid signature")]
    InvalidSignature,
}

/// Validates bearer tokens against the provider's published keys.
pub struct TokenVerifier {
    keys: KeySetCache,
    expected_issuer: String,
    client_id: String,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Create a verifier for one issuer and app client.
    pub fn new(
        keys: KeySetCache,
        expected_issuer: String,
        client_id: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            expected_issuer,
            client_id,
            clock,
        }
    }

    /// Validate structure, claims, and signature of a token.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyReason> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(VerifyReason::Malformed);
        }

        let header: TokenHeader = decode_part(parts[0])?;
        let claims: Claims = decode_part(parts[1])?;

        if claims.iss.as_deref() != Some(self.expected_issuer.as_str()) {
            return Err(VerifyReason::InvalidIssuer);
        }

        let token_use = claims.token_use.as_deref().unwrap_or_default();
        if token_use != "id" && token_use != "access" {
            return Err(VerifyReason::InvalidTokenUse);
        }

        // Access tokens carry scopes instead of a client-bound audience,
        // so only identity tokens get the audience check.
        if token_use == "id" && !claims.aud.equals(&self.client_id) {
            return Err(VerifyReason::InvalidAudience);
        }

        let now = self.clock.now_secs();
        match claims.exp {
            Some(exp) if exp > now => {}
            _ => return Err(VerifyReason::Expired),
        }

        let kid = header.kid.as_deref().ok_or(VerifyReason::Malformed)?;
        let jwk = self.keys.key_for(kid).await?;

        let algorithm = match jwk.alg.as_deref().unwrap_or("RS256") {
            "RS256" => Algorithm::RS256,
            "RS384" => Algorithm::RS384,
            "RS512" => Algorithm::RS512,
            other => return Err(VerifyReason::UnsupportedAlgorithm(other.to_string())),
        };

        let pem = jwk_to_pem(&jwk).map_err(|e| VerifyReason::InvalidKey(e.to_string()))?;
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| VerifyReason::InvalidKey(e.to_string()))?;

        let message = format!("{}.{}", parts[0], parts[1]);
        let valid = jsonwebtoken::crypto::verify(parts[2], message.as_bytes(), &key, algorithm)
            .map_err(|_| VerifyReason::InvalidSignature)?;
        if !valid {
            return Err(VerifyReason::InvalidSignature);
        }

        debug!(
            sub = claims.sub.as_deref().unwrap_or(""),
            token_use = %token_use,
            "token verified"
        );
        Ok(claims)
    }

    /// True when the token expires within the threshold (or carries no
    /// usable expiry at all).
    pub fn is_expiring_soon(&self, claims: &Claims, threshold_secs: i64) -> bool {
        match claims.exp {
            Some(exp) => exp - self.clock.now_secs() < threshold_secs,
            None => true,
        }
    }
}

fn decode_part<T: serde::de::DeserializeOwned>(part: &str) -> Result<T, VerifyReason> {
    let raw = URL_SAFE_NO_PAD
        .decode(part.as_bytes())
        .map_err(|_| VerifyReason::Malformed)?;
    serde_json::from_slice(&raw).map_err(|_| VerifyReason::Malformed)
}
