//! Key set fetching and caching.
//!
//! The provider publishes its signing keys as a JWKS document. The cache
//! holds one complete snapshot with an absolute expiry and replaces it
//! wholesale on refetch; concurrent readers see either the old set or the
//! new one, never a partial merge. Execution environments are ephemeral,
//! so the cache is best-effort and may start cold on any invocation.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::Clock;

/// One JSON Web Key as published by the provider. Immutable once fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key ID, matched against the token header.
    pub kid: String,
    /// Key type; only RSA keys are usable here.
    pub kty: String,
    /// Declared signing algorithm.
    pub alg: Option<String>,
    /// Key use (sig, enc).
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url big-endian.
    pub n: Option<String>,
    /// RSA public exponent, base64url big-endian.
    pub e: Option<String>,
}

/// JWKS document shape.
#[derive(Debug, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Why a signing key could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySetError {
    #[error("failed to fetch key set: {0}")]
    Fetch(String),
    #[error("key '{0}' not found in key set")]
    NotFound(String),
}

/// Source of key set documents.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the complete current key set.
    async fn fetch_keys(&self) -> Result<Vec<Jwk>, KeySetError>;
}

/// Fetches the key set over HTTPS from the provider's JWKS endpoint.
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    jwks_url: String,
}

impl HttpKeyFetcher {
    /// Create a fetcher for the given JWKS URL with a bounded timeout.
    pub fn new(jwks_url: String, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { client, jwks_url })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_keys(&self) -> Result<Vec<Jwk>, KeySetError> {
        debug!(url = %self.jwks_url, "fetching key set");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeySetError::Fetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(KeySetError::Fetch(format!(
                "key set endpoint returned status {}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySetError::Fetch(format!("invalid key set body: {}", e)))?;

        Ok(set.keys)
    }
}

struct CachedKeySet {
    keys: Vec<Jwk>,
    expires_at_millis: i64,
}

/// TTL-bounded, wholesale-replaced cache of the provider's key set.
pub struct KeySetCache {
    fetcher: Box<dyn KeyFetcher>,
    ttl_millis: i64,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CachedKeySet>>,
}

impl KeySetCache {
    /// Create an empty cache; the first lookup populates it.
    pub fn new(fetcher: Box<dyn KeyFetcher>, ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            ttl_millis: ttl_secs as i64 * 1000,
            clock,
            cached: RwLock::new(None),
        }
    }

    /// Resolve a signing key by key ID.
    ///
    /// Serves from the cached set while it is fresh. A missing kid or a
    /// stale/empty cache triggers exactly one synchronous refetch; a kid
    /// still absent after that is an error (keys rotate, but a second
    /// fetch within one invocation would return the same document).
    pub async fn key_for(&self, kid: &str) -> Result<Jwk, KeySetError> {
        let now = self.clock.now_millis();

        let fresh_lookup = {
            let guard = self
                .cached
                .read()
                .map_err(|_| KeySetError::Fetch("key set lock poisoned".to_string()))?;
            match guard.as_ref() {
                Some(set) if now < set.expires_at_millis => {
                    Some(set.keys.iter().find(|k| k.kid == kid).cloned())
                }
                _ => None,
            }
        };

        match fresh_lookup {
            Some(Some(jwk)) => return Ok(jwk),
            Some(None) => debug!(kid = %kid, "key not in cached set, refetching"),
            None => debug!("key set cache cold or expired, fetching"),
        }

        let keys = self.fetcher.fetch_keys().await?;
        info!(key_count = keys.len(), "key set cache refreshed");

        {
            let mut guard = self
                .cached
                .write()
                .map_err(|_| KeySetError::Fetch("key set lock poisoned".to_string()))?;
            *guard = Some(CachedKeySet {
                keys: keys.clone(),
                expires_at_millis: now + self.ttl_millis,
            });
        }

        keys.into_iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| KeySetError::NotFound(kid.to_string()))
    }
}
