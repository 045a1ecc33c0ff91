//! Token verification: key material conversion, key set caching, and
//! claim/signature validation.

mod jwks;
mod key;
mod verifier;

pub use jwks::{HttpKeyFetcher, Jwk, JwkSet, KeyFetcher, KeySetCache, KeySetError};
pub use key::{jwk_to_pem, KeyConversionError};
pub use verifier::{Audience, Claims, TokenVerifier, VerifyReason};
