//! Browser session surface: auth cookies and CSRF redirect state.
//!
//! Sessions are entirely cookie-carried; nothing is stored server-side.

mod cookies;
mod state;

pub use cookies::{
    clear_state_cookie, clear_token_cookies, parse_cookies, state_cookie, token_cookies,
    ACCESS_TOKEN_COOKIE, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, STATE_COOKIE,
};
pub use state::{decode_state, generate_state, Nonce, RedirectState, StateError};
