//! Gate configuration.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Configuration for the authentication gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// AWS region of the Cognito user pool.
    /// Example: "eu-west-1"
    #[serde(default)]
    pub region: String,

    /// Cognito user pool identifier (the key set id in the issuer URL).
    /// Example: "eu-west-1_AbCdEfGhI"
    #[serde(default)]
    pub user_pool_id: String,

    /// OAuth app client id registered with the user pool.
    #[serde(default)]
    pub client_id: String,

    /// OAuth app client secret. When absent, token calls skip Basic auth.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Hosted UI domain of the provider (authorize/logout/token endpoints).
    /// Example: "auth.example.com"
    #[serde(default)]
    pub provider_domain: String,

    /// Public-facing domain of the protected site, used to build absolute
    /// callback and redirect URLs.
    /// Example: "d111111abcdef8.cloudfront.net"
    #[serde(default)]
    pub public_domain: String,

    /// Lifetime of the CSRF state cookie and the state payload, in seconds.
    #[serde(default = "default_state_expiry")]
    pub state_expiry_secs: u64,

    /// Redirect to the refresh endpoint when a token expires within this
    /// many seconds.
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,

    /// Key set cache TTL in seconds.
    #[serde(default = "default_jwks_ttl")]
    pub jwks_ttl_secs: u64,

    /// Timeout applied to every outbound HTTP call, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_state_expiry() -> u64 {
    300 // 5 minutes
}

fn default_refresh_threshold() -> u64 {
    300 // 5 minutes before expiry
}

fn default_jwks_ttl() -> u64 {
    3600 // 1 hour
}

fn default_http_timeout() -> u64 {
    5
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            provider_domain: String::new(),
            public_domain: String::new(),
            state_expiry_secs: default_state_expiry(),
            refresh_threshold_secs: default_refresh_threshold(),
            jwks_ttl_secs: default_jwks_ttl(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl GateConfig {
    /// Load configuration from the environment.
    ///
    /// Required: `COGNITO_REGION`, `COGNITO_USER_POOL_ID`,
    /// `COGNITO_CLIENT_ID`, `COGNITO_DOMAIN`, `PUBLIC_DOMAIN`.
    /// Optional: `COGNITO_CLIENT_SECRET`, `AUTH_STATE_EXPIRY_SECS`,
    /// `AUTH_REFRESH_THRESHOLD_SECS`, `AUTH_JWKS_TTL_SECS`,
    /// `AUTH_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            region: env_required("COGNITO_REGION")?,
            user_pool_id: env_required("COGNITO_USER_POOL_ID")?,
            client_id: env_required("COGNITO_CLIENT_ID")?,
            client_secret: env_opt("COGNITO_CLIENT_SECRET"),
            provider_domain: env_required("COGNITO_DOMAIN")?,
            public_domain: env_required("PUBLIC_DOMAIN")?,
            ..Self::default()
        };

        if let Some(v) = env_opt("AUTH_STATE_EXPIRY_SECS") {
            config.state_expiry_secs = parse_secs("AUTH_STATE_EXPIRY_SECS", &v)?;
        }
        if let Some(v) = env_opt("AUTH_REFRESH_THRESHOLD_SECS") {
            config.refresh_threshold_secs = parse_secs("AUTH_REFRESH_THRESHOLD_SECS", &v)?;
        }
        if let Some(v) = env_opt("AUTH_JWKS_TTL_SECS") {
            config.jwks_ttl_secs = parse_secs("AUTH_JWKS_TTL_SECS", &v)?;
        }
        if let Some(v) = env_opt("AUTH_HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs = parse_secs("AUTH_HTTP_TIMEOUT_SECS", &v)?;
        }

        config
            .validate()
            .map_err(|e| anyhow!("invalid configuration: {}", e))?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.region.is_empty() {
            return Err("region is required".to_string());
        }
        if self.user_pool_id.is_empty() {
            return Err("user_pool_id is required".to_string());
        }
        if self.client_id.is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.provider_domain.is_empty() {
            return Err("provider_domain is required".to_string());
        }
        if self.public_domain.is_empty() {
            return Err("public_domain is required".to_string());
        }
        if self.http_timeout_secs == 0 {
            return Err("http_timeout_secs must be positive".to_string());
        }
        Ok(())
    }

    /// Issuer URL of the user pool, as it appears in the `iss` claim.
    pub fn issuer_url(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }

    /// JWKS endpoint of the user pool.
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer_url())
    }

    /// Absolute callback URL registered with the provider.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", base_url(&self.public_domain))
    }

    /// Absolute URL for a path on the protected site.
    pub fn full_url(&self, path: &str) -> String {
        format!("{}{}", base_url(&self.public_domain), path)
    }

    /// Hosted UI login URL carrying the given state parameter.
    pub fn login_url(&self, state: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("redirect_uri", &self.callback_url())
            .append_pair("state", state)
            .finish();
        format!("{}/oauth2/authorize?{}", base_url(&self.provider_domain), query)
    }

    /// Hosted UI logout URL, returning the browser to the site root.
    pub fn logout_url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("logout_uri", &self.full_url("/"))
            .finish();
        format!("{}/logout?{}", base_url(&self.provider_domain), query)
    }

    /// State expiry window in milliseconds.
    pub fn state_expiry_millis(&self) -> i64 {
        self.state_expiry_secs as i64 * 1000
    }
}

/// Prefix a bare domain with https; values that already carry a scheme are
/// used as-is (test servers pass full http URLs).
pub(crate) fn base_url(domain: &str) -> String {
    if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}

fn env_required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {}", name))
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("{} must be an integer number of seconds", name))
}
