//! Storage of the [`SessionContext`] in an encrypted cookie.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use gatekeep_platform_access::SessionContext;
use time::Duration as TimeDuration;
use tracing::debug;

use super::AppState;
use crate::error::ApiError;

/// Name of the encrypted context cookie.
pub const CONTEXT_COOKIE: &str = "session";

/// Reads the context from the request cookies.
///
/// A missing, undecryptable or unparseable cookie yields an empty context.
pub fn load(state: &AppState, headers: &HeaderMap) -> (PrivateCookieJar, SessionContext) {
    let jar = PrivateCookieJar::from_headers(headers, state.cookie_key.clone());
    let context = jar
        .get(CONTEXT_COOKIE)
        .and_then(|cookie| {
            serde_json::from_str(cookie.value())
                .map_err(|e| debug!(error = %e, "discarding unreadable session context"))
                .ok()
        })
        .unwrap_or_default();
    (jar, context)
}

/// Writes `context` into the jar; an empty context removes the cookie.
pub fn save(
    state: &AppState,
    jar: PrivateCookieJar,
    context: &SessionContext,
) -> Result<PrivateCookieJar, ApiError> {
    if context.is_empty() {
        return Ok(jar.remove(Cookie::build(CONTEXT_COOKIE).path("/")));
    }

    let value = serde_json::to_string(context).map_err(ApiError::internal)?;
    let cookie = Cookie::build((CONTEXT_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(state.config.session.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(
            state.config.session.default_max_age_secs,
        ));
    Ok(jar.add(cookie))
}
