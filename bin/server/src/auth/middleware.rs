//! Authorization extractors for Axum.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, HeaderName, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use gatekeep_platform_access::{
    AuthenticatedUser, AuthorizationError, CredentialSource, Requirement, SessionId, User,
};
use std::sync::Arc;
use tracing::warn;

use super::{
    AppState, context,
    db::{SessionRepository, UserRepository},
};
use crate::error::ApiError;

/// Header carrying a credential from trusted in-cluster callers.
pub const INTERNAL_AUTHORIZATION: HeaderName = HeaderName::from_static("x-internal-authorization");

/// Returns the token of a `Bearer` header value.
fn bearer_token(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Picks the credential a request presents, in precedence order.
fn credential(state: &AppState, headers: &HeaderMap) -> Option<(String, CredentialSource)> {
    if state.config.trusts_internal_header() {
        if let Some(token) = bearer_token(headers, &INTERNAL_AUTHORIZATION) {
            return Some((token, CredentialSource::InternalHeader));
        }
    }
    if let Some(token) = bearer_token(headers, &AUTHORIZATION) {
        return Some((token, CredentialSource::BearerHeader));
    }
    let (_, ctx) = context::load(state, headers);
    ctx.session_id
        .map(|id| (id.as_str().to_string(), CredentialSource::SessionCookie))
}

/// Resolves a credential to an active user.
///
/// Session ids are tried first. Anything that is not shaped like a session
/// id is then offered to the identity provider as an access token, whose
/// uid must match exactly one active account by login id or identity uid.
pub async fn resolve_credential(
    state: &AppState,
    credential: &str,
) -> Result<Option<(User, Option<SessionId>)>, sqlx::Error> {
    let sessions = SessionRepository::new(state.db_pool.clone());
    if let Some(user) = sessions.resolve(credential).await? {
        return Ok(Some((user, Some(SessionId::new(credential.to_string())))));
    }
    if SessionId::has_session_shape(credential) {
        return Ok(None);
    }

    let uid = match state
        .provider
        .get_identity_uid_from_access_token(credential)
        .await
    {
        Ok(Some(uid)) => uid,
        Ok(None) => return Ok(None),
        Err(report) => {
            warn!(error = %report, "access token verification failed");
            return Ok(None);
        }
    };

    let mut users = UserRepository::new(state.db_pool.clone())
        .find_active_by_identity_uid(&uid)
        .await?;
    match users.len() {
        1 => Ok(users.pop().map(|user| (user, None))),
        0 => Ok(None),
        matches => {
            warn!(uid = %uid, error = %AuthorizationError::AmbiguousIdentity { matches }, "refusing access token");
            Ok(None)
        }
    }
}

/// Identifies the caller of a request, if any.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthenticatedUser>, AuthRejection> {
    let Some((token, source)) = credential(state, headers) else {
        return Ok(None);
    };
    let resolved = resolve_credential(state, &token)
        .await
        .map_err(|e| AuthRejection::InternalError(e.to_string()))?;
    Ok(resolved.map(|(user, session_id)| AuthenticatedUser::new(user, session_id, source)))
}

async fn require<S>(
    parts: &mut Parts,
    state: &S,
    requirement: Requirement,
) -> Result<AuthenticatedUser, AuthRejection>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    let app_state = Arc::<AppState>::from_ref(state);
    let user = authenticate(&app_state, &parts.headers)
        .await?
        .ok_or(AuthRejection::NotAuthenticated)?;

    if !user.satisfies(requirement) {
        warn!(
            username = %user.username(),
            source = ?user.source(),
            requirement = requirement.as_str(),
            "caller does not meet route requirement"
        );
        return Err(AuthRejection::RequirementNotMet(
            AuthorizationError::RequirementNotMet {
                username: user.username().to_string(),
                requirement: requirement.as_str(),
            },
        ));
    }
    Ok(user)
}

/// Extractor for requiring any active user.
pub struct RequireUser(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require(parts, state, Requirement::Authenticated)
            .await
            .map(RequireUser)
    }
}

/// Extractor for requiring a developer.
pub struct RequireDeveloper(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireDeveloper
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require(parts, state, Requirement::Developer)
            .await
            .map(RequireDeveloper)
    }
}

/// Extractor for requiring a developer or a service account.
pub struct RequireDevOrServiceAccount(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireDevOrServiceAccount
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require(parts, state, Requirement::DeveloperOrServiceAccount)
            .await
            .map(RequireDevOrServiceAccount)
    }
}

/// Extractor for optionally getting the caller.
///
/// Returns None for anonymous requests and unknown credentials.
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        authenticate(&app_state, &parts.headers)
            .await
            .map(MaybeUser)
    }
}

/// Rejection type for authorization extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    RequirementNotMet(AuthorizationError),
    InternalError(String),
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::NotAuthenticated => {
                ApiError::unauthorized(AuthorizationError::NotAuthenticated.to_string())
            }
            AuthRejection::RequirementNotMet(e) => ApiError::unauthorized(e.to_string()),
            AuthRejection::InternalError(reason) => ApiError::Internal(reason),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers, &AUTHORIZATION).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers, &AUTHORIZATION), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers, &AUTHORIZATION), None);
    }

    #[test]
    fn unmet_requirements_are_unauthorized() {
        let rejection = AuthRejection::RequirementNotMet(AuthorizationError::RequirementNotMet {
            username: "alice".to_string(),
            requirement: Requirement::Developer.as_str(),
        });
        assert_eq!(
            rejection.into_response().status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }
}
