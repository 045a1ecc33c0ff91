//! CSRF-bound redirect state.
//!
//! The login redirect carries an opaque `state` value both as an OAuth
//! query parameter and in a short-lived cookie. The callback is accepted
//! only when the two are byte-identical and fresh (double-submit CSRF
//! defense). The payload itself is readable by the client and is not
//! signed; the guarantee is that the browser presenting the callback is
//! the browser that received the cookie, nothing more.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::clock::Clock;

/// Random nonce embedded in the state payload (16 bytes, hex-encoded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; 16]);

impl Nonce {
    /// Generate a new random nonce.
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Hex string form used inside the state payload.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Decoded state payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectState {
    /// Path the viewer originally requested.
    pub uri: String,
    /// Random nonce making each state value unique.
    pub nonce: String,
    /// Issue time, epoch milliseconds.
    pub ts: i64,
}

/// Why a state value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Query parameter and cookie differ: possible CSRF.
    #[error("state mismatch")]
    Mismatch,
    /// Not base64url-encoded JSON of the expected shape.
    #[error("malformed state")]
    Malformed,
    /// Issued longer ago than the expiry window allows.
    #[error("state expired")]
    Expired,
}

/// Produce a fresh state value recording the originally requested path.
pub fn generate_state(original_uri: &str, clock: &dyn Clock) -> String {
    let state = RedirectState {
        uri: original_uri.to_string(),
        nonce: Nonce::new().to_hex(),
        ts: clock.now_millis(),
    };
    // Serializing a struct of two strings and an integer cannot fail.
    let json = serde_json::to_string(&state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json.as_bytes())
}

/// Validate a callback `state` parameter against the stored cookie value.
///
/// The comparison runs first: a payload is never even decoded unless the
/// browser proved it holds the matching cookie.
pub fn decode_state(
    candidate: &str,
    stored: &str,
    expiry_millis: i64,
    clock: &dyn Clock,
) -> Result<RedirectState, StateError> {
    if candidate != stored {
        warn!("state parameter does not match state cookie");
        return Err(StateError::Mismatch);
    }

    let raw = URL_SAFE_NO_PAD
        .decode(candidate.as_bytes())
        .map_err(|_| StateError::Malformed)?;
    let state: RedirectState =
        serde_json::from_slice(&raw).map_err(|_| StateError::Malformed)?;

    if clock.now_millis() - state.ts > expiry_millis {
        warn!("state value expired");
        return Err(StateError::Expired);
    }

    Ok(state)
}
