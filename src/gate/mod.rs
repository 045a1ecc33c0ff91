//! Per-request authentication state machine.
//!
//! The edge platform routes every viewer request through [`AuthGate::check`]
//! and the two dedicated auth paths through [`AuthGate::callback`] and
//! [`AuthGate::refresh`]. Each entry point is a function from the request
//! and its cookies to a single outgoing action; nothing is stored between
//! invocations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::http::{EdgeResponse, GateAction, ViewerRequest};
use crate::jwt::{Claims, HttpKeyFetcher, KeyFetcher, KeySetCache, TokenVerifier, VerifyReason};
use crate::session::{
    clear_state_cookie, clear_token_cookies, decode_state, generate_state, parse_cookies,
    state_cookie, token_cookies, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, STATE_COOKIE,
};
use crate::token::TokenClient;

/// Path the provider redirects back to with `code` and `state`.
pub const CALLBACK_PATH: &str = "/auth/callback";
/// Path that performs the silent token refresh round-trip.
pub const REFRESH_PATH: &str = "/auth/refresh";
/// Path that ends the session.
pub const LOGOUT_PATH: &str = "/auth/logout";

const AUTH_PATH_PREFIX: &str = "/auth/";

/// Where a browser session stands, as witnessed by one request's cookies.
///
/// Conceptually the session moves Anonymous → (login redirect) →
/// Authenticated → (approaching expiry) → refresh or re-login, with logout
/// reachable from anywhere. Classification is kept separate from response
/// construction so `check` has to handle every branch explicitly.
enum SessionState {
    /// No identity token cookie.
    Anonymous,
    /// Identity token verified, comfortable lifetime left.
    Authenticated(Claims),
    /// Identity token verified but inside the refresh threshold.
    Expiring { has_refresh_token: bool },
    /// Identity token present but rejected.
    Invalid(VerifyReason),
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshParams {
    redirect_uri: Option<String>,
}

/// The authentication gate.
pub struct AuthGate {
    config: GateConfig,
    verifier: TokenVerifier,
    tokens: TokenClient,
    clock: Arc<dyn Clock>,
}

impl AuthGate {
    /// Create a gate that fetches keys from the configured provider and
    /// uses wall-clock time.
    pub fn new(config: GateConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let fetcher = HttpKeyFetcher::new(config.jwks_url(), timeout)?;
        Self::with_components(config, Box::new(fetcher), Arc::new(SystemClock))
    }

    /// Create a gate with an injected key source and clock.
    pub fn with_components(
        config: GateConfig,
        key_fetcher: Box<dyn KeyFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("invalid gate configuration: {}", e))?;

        let keys = KeySetCache::new(key_fetcher, config.jwks_ttl_secs, Arc::clone(&clock));
        let verifier = TokenVerifier::new(
            keys,
            config.issuer_url(),
            config.client_id.clone(),
            Arc::clone(&clock),
        );
        let tokens = TokenClient::new(Duration::from_secs(config.http_timeout_secs))?;

        Ok(Self {
            config,
            verifier,
            tokens,
            clock,
        })
    }

    /// Entry point for every normal viewer request.
    pub async fn check(&self, request: ViewerRequest) -> GateAction {
        if request.uri == LOGOUT_PATH {
            info!("logout requested");
            return GateAction::Respond(EdgeResponse::redirect(
                &self.config.logout_url(),
                clear_token_cookies(),
            ));
        }

        // Callback and refresh have their own entry points.
        if request.uri.starts_with(AUTH_PATH_PREFIX) {
            debug!(uri = %request.uri, "auth path, passing through");
            return GateAction::Forward(request);
        }

        let cookies = parse_cookies(request.cookie_lines());
        match self.classify(&cookies).await {
            SessionState::Anonymous => {
                debug!(uri = %request.uri, "no identity token, redirecting to login");
                self.login_redirect(&request.uri, false)
            }
            SessionState::Invalid(reason) => {
                warn!(uri = %request.uri, reason = %reason, "token rejected, redirecting to login");
                self.login_redirect(&request.uri, true)
            }
            SessionState::Expiring {
                has_refresh_token: true,
            } => {
                debug!(uri = %request.uri, "token expiring soon, redirecting to refresh");
                let encoded: String =
                    form_urlencoded::byte_serialize(request.uri.as_bytes()).collect();
                GateAction::Respond(EdgeResponse::redirect(
                    &format!("{}?redirect_uri={}", REFRESH_PATH, encoded),
                    Vec::new(),
                ))
            }
            SessionState::Expiring {
                has_refresh_token: false,
            } => {
                debug!(uri = %request.uri, "token expiring soon, no refresh token, redirecting to login");
                self.login_redirect(&request.uri, false)
            }
            SessionState::Authenticated(claims) => {
                debug!(
                    uri = %request.uri,
                    sub = claims.sub.as_deref().unwrap_or(""),
                    "token valid, forwarding"
                );
                GateAction::Forward(request)
            }
        }
    }

    /// Entry point for the provider's redirect back at the callback path.
    pub async fn callback(&self, request: ViewerRequest) -> GateAction {
        let params: CallbackParams =
            serde_urlencoded::from_str(&request.querystring).unwrap_or_default();

        if let Some(error) = params.error {
            warn!(error = %error, "provider returned error on callback");
            let message = params.error_description.unwrap_or(error);
            return GateAction::Respond(EdgeResponse::error_page(&format!(
                "Authentication failed: {}",
                message
            )));
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) => (code, state),
            _ => {
                warn!("callback missing code or state parameter");
                return GateAction::Respond(EdgeResponse::error_page(
                    "Missing required parameters",
                ));
            }
        };

        let cookies = parse_cookies(request.cookie_lines());
        let stored = match cookies.get(STATE_COOKIE) {
            Some(stored) => stored,
            None => {
                warn!("no state cookie on callback");
                return GateAction::Respond(EdgeResponse::error_page("Invalid session state"));
            }
        };

        let state_data = match decode_state(
            &state,
            stored,
            self.config.state_expiry_millis(),
            self.clock.as_ref(),
        ) {
            Ok(data) => data,
            Err(reason) => {
                warn!(reason = %reason, "state validation failed");
                return GateAction::Respond(EdgeResponse::error_page("Invalid or expired state"));
            }
        };

        let tokens = match self
            .tokens
            .exchange_code(
                &code,
                &self.config.provider_domain,
                &self.config.client_id,
                self.config.client_secret.as_deref(),
                &self.config.callback_url(),
            )
            .await
        {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(error = %error, "code exchange failed");
                return GateAction::Respond(EdgeResponse::error_page(
                    "Failed to complete authentication",
                ));
            }
        };

        let mut set_cookies = token_cookies(
            &tokens.id_token,
            &tokens.access_token,
            tokens.expires_in,
            tokens.refresh_token.as_deref(),
        );
        set_cookies.push(clear_state_cookie());

        let target = if state_data.uri.is_empty() {
            "/".to_string()
        } else {
            state_data.uri
        };
        info!(uri = %target, "authentication complete");
        GateAction::Respond(EdgeResponse::redirect(
            &self.config.full_url(&target),
            set_cookies,
        ))
    }

    /// Entry point for the refresh path.
    pub async fn refresh(&self, request: ViewerRequest) -> GateAction {
        let params: RefreshParams =
            serde_urlencoded::from_str(&request.querystring).unwrap_or_default();
        let target = params.redirect_uri.unwrap_or_else(|| "/".to_string());

        let cookies = parse_cookies(request.cookie_lines());
        let refresh_token = match cookies.get(REFRESH_TOKEN_COOKIE) {
            Some(token) => token,
            None => {
                debug!("no refresh token, redirecting to login");
                return self.login_redirect(&target, true);
            }
        };

        match self
            .tokens
            .refresh(
                refresh_token,
                &self.config.provider_domain,
                &self.config.client_id,
                self.config.client_secret.as_deref(),
            )
            .await
        {
            Ok(tokens) => {
                // The refresh grant does not reissue a refresh token; the
                // existing cookie stays untouched.
                let set_cookies = token_cookies(
                    &tokens.id_token,
                    &tokens.access_token,
                    tokens.expires_in,
                    None,
                );
                info!(uri = %target, "token refresh complete");
                GateAction::Respond(EdgeResponse::redirect(
                    &self.config.full_url(&target),
                    set_cookies,
                ))
            }
            Err(error) => {
                warn!(error = %error, "token refresh failed, redirecting to login");
                self.login_redirect(&target, true)
            }
        }
    }

    async fn classify(&self, cookies: &HashMap<String, String>) -> SessionState {
        let id_token = match cookies.get(ID_TOKEN_COOKIE) {
            Some(token) => token,
            None => return SessionState::Anonymous,
        };

        match self.verifier.verify(id_token).await {
            Err(reason) => SessionState::Invalid(reason),
            Ok(claims) => {
                if self
                    .verifier
                    .is_expiring_soon(&claims, self.config.refresh_threshold_secs as i64)
                {
                    SessionState::Expiring {
                        has_refresh_token: cookies.contains_key(REFRESH_TOKEN_COOKIE),
                    }
                } else {
                    SessionState::Authenticated(claims)
                }
            }
        }
    }

    /// Redirect to the hosted login page with a fresh state value, mirrored
    /// into the state cookie. Optionally clears the token cookies first.
    fn login_redirect(&self, original_uri: &str, clear_tokens: bool) -> GateAction {
        let state = generate_state(original_uri, self.clock.as_ref());
        let mut cookies = if clear_tokens {
            clear_token_cookies()
        } else {
            Vec::new()
        };
        cookies.push(state_cookie(&state, self.config.state_expiry_secs));
        GateAction::Respond(EdgeResponse::redirect(
            &self.config.login_url(&state),
            cookies,
        ))
    }
}
