//! Edge Authentication Gate
//!
//! This crate protects an origin behind a CDN using cookie-carried
//! OAuth2/OIDC tokens issued by an Amazon Cognito user pool. The edge
//! platform invokes one of three entry points per viewer request
//! ([`AuthGate::check`], [`AuthGate::callback`], [`AuthGate::refresh`])
//! and applies the returned action: forward the request to the origin,
//! send a redirect, or send an error page.
//!
//! Components:
//! - `session`: cookie codec and CSRF-bound redirect state
//! - `jwt`: JWKS cache, JWK-to-PEM conversion, token verification
//! - `token`: authorization-code and refresh-token grants
//! - `gate`: the per-request state machine composing the above

pub mod clock;
pub mod config;
pub mod gate;
pub mod http;
pub mod jwt;
pub mod session;
pub mod token;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GateConfig;
pub use gate::AuthGate;
pub use http::{EdgeResponse, GateAction, ViewerRequest};
pub use jwt::{Claims, Jwk, KeyFetcher, KeySetCache, KeySetError, TokenVerifier, VerifyReason};
pub use token::{GrantError, TokenClient, TokenResponse};
