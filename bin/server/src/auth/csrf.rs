//! Double-submit CSRF defense.
//!
//! Unsafe requests that carry the context cookie must echo the `_csrf`
//! cookie in the `X-CSRF-Token` header or a `_csrf` form field. Requests
//! without the context cookie cannot ride a browser session and pass.

use axum::{
    body::{Body, to_bytes},
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, Method, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use gatekeep_platform_access::token::generate_csrf_token;
use std::sync::Arc;
use tracing::debug;

use super::{AppState, context::CONTEXT_COOKIE};
use crate::error::ApiError;

/// Cookie holding the CSRF token.
pub const CSRF_COOKIE: &str = "_csrf";

/// Header a script echoes the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Form field a page echoes the token in.
const CSRF_FORM_FIELD: &str = "_csrf";

/// Largest form body buffered while looking for the token.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Route templates that skip the check.
pub const CSRF_EXEMPT_ROUTES: &[&str] = &[
    "/api/v1alpha/verify_dev_credentials",
    "/api/v1alpha/verify_dev_or_sa_credentials",
];

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

fn form_token(body: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(name, _)| name == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned())
}

/// Axum middleware enforcing the check. Install with `route_layer` so the
/// matched route template is known.
pub async fn csrf_protect(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let jar = CookieJar::from_headers(request.headers());

    if is_safe(request.method()) {
        let needs_token = jar.get(CSRF_COOKIE).is_none();
        let response = next.run(request).await;
        if !needs_token {
            return Ok(response);
        }
        let cookie = Cookie::build((CSRF_COOKIE, generate_csrf_token()))
            .path("/")
            .secure(state.config.session.secure_cookies)
            .same_site(SameSite::Strict);
        return Ok((jar.add(cookie), response).into_response());
    }

    let exempt = request
        .extensions()
        .get::<MatchedPath>()
        .is_some_and(|path| CSRF_EXEMPT_ROUTES.contains(&path.as_str()));
    if exempt || jar.get(CONTEXT_COOKIE).is_none() {
        return Ok(next.run(request).await);
    }

    let Some(expected) = jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) else {
        return Err(ApiError::Forbidden("missing CSRF cookie".to_string()));
    };

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if header_token.as_deref() == Some(expected.as_str()) {
        return Ok(next.run(request).await);
    }

    if is_form(request.headers()) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|e| ApiError::BadRequest(format!("unreadable form body: {e}")))?;
        if form_token(&bytes).as_deref() == Some(expected.as_str()) {
            return Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await);
        }
    }

    debug!("CSRF token missing or mismatched");
    Err(ApiError::Forbidden("CSRF token mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::TRACE));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::DELETE));
    }

    #[test]
    fn finds_form_token() {
        assert_eq!(
            form_token(b"next=%2Fuser&_csrf=abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(form_token(b"next=%2Fuser"), None);
    }
}
