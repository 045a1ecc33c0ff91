//! Token endpoint client: authorization-code and refresh-token grants.

mod client;

pub use client::{GrantError, TokenClient, TokenResponse, DEFAULT_HTTP_TIMEOUT};
