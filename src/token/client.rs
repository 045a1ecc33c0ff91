//! OAuth2 token endpoint client.
//!
//! Each grant is a single form-encoded POST with no retry: the invoking
//! platform gives one request a hard deadline, and an authorization code
//! is single-use anyway. Failures surface immediately and the caller
//! decides the user-facing fallback.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::base_url;

/// Default timeout for token endpoint calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN_ENDPOINT_PATH: &str = "/oauth2/token";

/// A successful token grant. Either fully present or an error; callers
/// never see a partial response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    /// Only issued on the authorization-code grant; refresh grants keep
    /// the existing refresh token.
    pub refresh_token: Option<String>,
    /// Lifetime of the id/access tokens, seconds.
    pub expires_in: u64,
    pub token_type: String,
}

/// Wire shape of the token endpoint response; success and error variants
/// share one body.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Why a grant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    /// The provider rejected the grant; `error`/`error_description` are
    /// passed through verbatim.
    #[error("provider rejected grant: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },
    /// The token endpoint could not be reached in time.
    #[error("token endpoint transport error: {0}")]
    Transport(String),
    /// The endpoint answered with something other than a token response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Client for the provider's token endpoint.
pub struct TokenClient {
    http: reqwest::Client,
}

impl TokenClient {
    /// Create a client with a bounded per-request timeout.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { http })
    }

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        provider_domain: &str,
        client_id: &str,
        client_secret: Option<&str>,
        redirect_uri: &str,
    ) -> Result<TokenResponse, GrantError> {
        debug!("exchanging authorization code");
        self.token_request(
            provider_domain,
            client_id,
            client_secret,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    /// Obtain fresh id/access tokens from a refresh token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        provider_domain: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, GrantError> {
        debug!("refreshing tokens");
        self.token_request(
            provider_domain,
            client_id,
            client_secret,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn token_request(
        &self,
        provider_domain: &str,
        client_id: &str,
        client_secret: Option<&str>,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, GrantError> {
        let url = format!("{}{}", base_url(provider_domain), TOKEN_ENDPOINT_PATH);

        let mut request = self.http.post(&url).form(form);
        if let Some(secret) = client_secret {
            request = request.basic_auth(client_id, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        // The provider answers grant rejections with an error body and a
        // non-2xx status; the body is authoritative either way.
        let raw: RawTokenResponse = response
            .json()
            .await
            .map_err(|e| GrantError::InvalidResponse(e.to_string()))?;

        if let Some(error) = raw.error {
            warn!(error = %error, "provider rejected grant");
            return Err(GrantError::Provider {
                error,
                description: raw.error_description,
            });
        }

        match (raw.id_token, raw.access_token, raw.expires_in) {
            (Some(id_token), Some(access_token), Some(expires_in)) => Ok(TokenResponse {
                id_token,
                access_token,
                refresh_token: raw.refresh_token,
                expires_in,
                token_type: raw.token_type.unwrap_or_else(|| "Bearer".to_string()),
            }),
            _ => Err(GrantError::InvalidResponse(
                "response is missing token fields".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_body() -> serde_json::Value {
        json!({
            "id_token": "id-jwt",
            "access_token": "access-jwt",
            "refresh_token": "refresh-opaque",
            "expires_in": 3600,
            "token_type": "Bearer"
        })
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("redirect_uri=https%3A%2F%2Fsite.example.com%2Fauth%2Fcallback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let tokens = client
            .exchange_code(
                "abc",
                &server.uri(),
                "client-abc",
                None,
                "https://site.example.com/auth/callback",
            )
            .await
            .unwrap();

        assert_eq!(tokens.id_token, "id-jwt");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-opaque"));
        assert_eq!(tokens.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_basic_auth_sent_when_secret_configured() {
        let server = MockServer::start().await;
        let expected = format!("Basic {}", STANDARD.encode("client-abc:s3cret"));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("authorization", expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let result = client
            .exchange_code("abc", &server.uri(), "client-abc", Some("s3cret"), "https://x/")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_grant_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-opaque"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                // Refresh grants do not reissue a refresh token.
                "id_token": "id-jwt-2",
                "access_token": "access-jwt-2",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let tokens = client
            .refresh("refresh-opaque", &server.uri(), "client-abc", None)
            .await
            .unwrap();
        assert_eq!(tokens.id_token, "id-jwt-2");
        assert_eq!(tokens.refresh_token, None);
    }

    #[tokio::test]
    async fn test_provider_error_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Code has expired"
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let err = client
            .exchange_code("stale", &server.uri(), "client-abc", None, "https://x/")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GrantError::Provider {
                error: "invalid_grant".to_string(),
                description: Some("Code has expired".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let err = client
            .refresh("r", &server.uri(), "client-abc", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_token_fields_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "only-access",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        let err = client
            .refresh("r", &server.uri(), "client-abc", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Nothing listens on this port.
        let client = TokenClient::new(Duration::from_millis(500)).unwrap();
        let err = client
            .refresh("r", "http://127.0.0.1:1", "client-abc", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::Transport(_)));
    }
}
