//! Auth cookie parsing and construction.

use cookie::{Cookie, SameSite};
use std::collections::HashMap;
use time::Duration;

/// Cookie holding the provider-issued identity token.
pub const ID_TOKEN_COOKIE: &str = "cognito_id_token";
/// Cookie holding the provider-issued access token.
pub const ACCESS_TOKEN_COOKIE: &str = "cognito_access_token";
/// Cookie holding the long-lived refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "cognito_refresh_token";
/// Cookie holding the CSRF state value during a login round-trip.
pub const STATE_COOKIE: &str = "cognito_state";

/// Refresh token cookie lifetime: 30 days.
const REFRESH_TOKEN_MAX_AGE_SECS: i64 = 2_592_000;

/// Parse raw `Cookie` header lines into a name-to-value map.
///
/// Values are percent-decoded; malformed pairs are skipped silently.
/// Later occurrences of a name win.
pub fn parse_cookies(lines: &[String]) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for line in lines {
        for cookie in Cookie::split_parse_encoded(line.as_str()).flatten() {
            cookies.insert(cookie.name().to_string(), cookie.value().to_string());
        }
    }
    cookies
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64, same_site: SameSite) -> String {
    Cookie::build((name, value))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(same_site)
        .max_age(Duration::seconds(max_age_secs))
        .build()
        .to_string()
}

/// `Set-Cookie` values for a freshly obtained token set.
///
/// Identity and access tokens live as long as the provider says they do.
/// The refresh token gets `SameSite=Strict`: it is the most sensitive of
/// the four and is only ever read on same-site navigations.
pub fn token_cookies(
    id_token: &str,
    access_token: &str,
    expires_in_secs: u64,
    refresh_token: Option<&str>,
) -> Vec<String> {
    let token_max_age = expires_in_secs as i64;
    let mut cookies = vec![
        build_cookie(ID_TOKEN_COOKIE, id_token, token_max_age, SameSite::Lax),
        build_cookie(ACCESS_TOKEN_COOKIE, access_token, token_max_age, SameSite::Lax),
    ];
    if let Some(refresh) = refresh_token {
        cookies.push(build_cookie(
            REFRESH_TOKEN_COOKIE,
            refresh,
            REFRESH_TOKEN_MAX_AGE_SECS,
            SameSite::Strict,
        ));
    }
    cookies
}

/// `Set-Cookie` values clearing all three token cookies.
pub fn clear_token_cookies() -> Vec<String> {
    vec![
        build_cookie(ID_TOKEN_COOKIE, "", 0, SameSite::Lax),
        build_cookie(ACCESS_TOKEN_COOKIE, "", 0, SameSite::Lax),
        build_cookie(REFRESH_TOKEN_COOKIE, "", 0, SameSite::Strict),
    ]
}

/// `Set-Cookie` value for the CSRF state cookie.
pub fn state_cookie(state: &str, max_age_secs: u64) -> String {
    build_cookie(STATE_COOKIE, state, max_age_secs as i64, SameSite::Lax)
}

/// `Set-Cookie` value clearing the CSRF state cookie.
pub fn clear_state_cookie() -> String {
    build_cookie(STATE_COOKIE, "", 0, SameSite::Lax)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let lines = vec!["a=1; b=2; c=hello%20world".to_string()];
        let cookies = parse_cookies(&lines);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("2"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("hello world"));
    }

    #[test]
    fn test_parse_multiple_lines() {
        let lines = vec![
            format!("{}=tok-id", ID_TOKEN_COOKIE),
            format!("{}=tok-refresh", REFRESH_TOKEN_COOKIE),
        ];
        let cookies = parse_cookies(&lines);
        assert_eq!(cookies.len(), 2);
        assert_eq!(
            cookies.get(REFRESH_TOKEN_COOKIE).map(String::as_str),
            Some("tok-refresh")
        );
    }

    #[test]
    fn test_parse_skips_malformed_pairs() {
        let lines = vec!["good=1; noequals; ; another=2".to_string()];
        let cookies = parse_cookies(&lines);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.contains_key("good"));
        assert!(cookies.contains_key("another"));
    }

    #[test]
    fn test_parse_no_lines() {
        assert!(parse_cookies(&[]).is_empty());
    }

    #[test]
    fn test_token_cookie_attributes() {
        let cookies = token_cookies("id-jwt", "access-jwt", 3600, Some("refresh-opaque"));
        assert_eq!(cookies.len(), 3);

        let id = &cookies[0];
        assert!(id.starts_with("cognito_id_token=id-jwt"));
        assert!(id.contains("HttpOnly"));
        assert!(id.contains("Secure"));
        assert!(id.contains("SameSite=Lax"));
        assert!(id.contains("Path=/"));
        assert!(id.contains("Max-Age=3600"));

        let refresh = &cookies[2];
        assert!(refresh.starts_with("cognito_refresh_token=refresh-opaque"));
        assert!(refresh.contains("SameSite=Strict"));
        assert!(refresh.contains("Max-Age=2592000"));
    }

    #[test]
    fn test_token_cookies_without_refresh() {
        let cookies = token_cookies("id-jwt", "access-jwt", 900, None);
        assert_eq!(cookies.len(), 2);
        assert!(!cookies.iter().any(|c| c.contains(REFRESH_TOKEN_COOKIE)));
    }

    #[test]
    fn test_clear_cookies_expire_immediately() {
        let cookies = clear_token_cookies();
        assert_eq!(cookies.len(), 3);
        for cookie in &cookies {
            assert!(cookie.contains("Max-Age=0"), "not cleared: {}", cookie);
        }
        assert!(cookies[0].starts_with("cognito_id_token=;"));
    }

    #[test]
    fn test_state_cookie_roundtrip() {
        let set = state_cookie("opaque-state", 300);
        assert!(set.starts_with("cognito_state=opaque-state"));
        assert!(set.contains("Max-Age=300"));

        let cleared = clear_state_cookie();
        assert!(cleared.starts_with("cognito_state=;"));
        assert!(cleared.contains("Max-Age=0"));
    }
}
