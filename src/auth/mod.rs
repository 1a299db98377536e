pub mod claims;
pub mod credential;
pub mod domain_gate;
pub mod gotrue;
pub mod provider;
pub mod reconcile;

use axum_extra::extract::cookie::{Cookie, SameSite};

pub use credential::{CallbackCredential, ImplicitToken};
pub use domain_gate::{DomainGate, DomainRejection};
pub use gotrue::GoTrueClient;
pub use provider::{IdentityProvider, OAuthProvider, ProviderError, ProviderSession, ProviderUser};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/auth/login";

/// Opaque id of the server-side session.
pub const SESSION_COOKIE: &str = "mp_session";
/// Opaque id of the pending sign-in (PKCE verifier, return URL).
pub const FLOW_COOKIE: &str = "mp_flow";

/// Login page carrying a user-visible reason.
pub fn login_path_with_error(message: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("error", message)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

pub fn auth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Removal cookie; the path has to match the one the cookie was set with.
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}
