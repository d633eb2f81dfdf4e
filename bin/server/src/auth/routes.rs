//! Browser routes: login, signup, callback, account creation, and logout.
//!
//! Every route threads the browser through the encrypted
//! [`SessionContext`] cookie. Pages are rendered as JSON.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::PrivateCookieJar;
use gatekeep_platform_access::{
    AccountState, AuthenticationError, CallbackParams, FlowCaller, MessageKind, NewUser,
    SessionContext, User, VerifiedIdentity, user::username_from_email,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

use super::{
    AppState, MaybeUser, RequireUser, context,
    db::{CopyPasteTokenRepository, SessionRepository, UserRepository},
};
use crate::config::ServerConfig;
use crate::error::{AccountStoreError, ApiError};

/// `?next=` query parameter.
#[derive(Debug, Deserialize)]
pub struct NextQuery {
    next: Option<String>,
}

/// Account summary shown while an account is created or after it failed.
#[derive(Debug, Serialize)]
struct AccountStatus<'a> {
    username: &'a str,
    state: AccountState,
    login_id: Option<&'a str>,
}

impl<'a> AccountStatus<'a> {
    fn of(user: &'a User) -> Self {
        Self {
            username: &user.username,
            state: user.state,
            login_id: user.login_id.as_deref(),
        }
    }
}

/// Resolves a `next` target against the external URL and checks that it
/// stays on an allowed host.
pub fn validate_next(config: &ServerConfig, next: Option<&str>) -> Result<String, ApiError> {
    let default_next = config.external_url("/user");
    let next = next.unwrap_or(&default_next);
    if next.is_empty() {
        return Err(ApiError::BadRequest("Invalid next page: empty".to_string()));
    }

    let base = Url::parse(&config.external_url)
        .map_err(|e| ApiError::internal(format!("invalid external_url: {e}")))?;
    let target = base
        .join(next)
        .map_err(|_| ApiError::BadRequest(format!("Invalid next page: '{next}'")))?;

    let allowed = matches!(target.scheme(), "http" | "https")
        && target.host_str().is_some_and(|host| {
            base.host_str() == Some(host) || config.allowed_redirect_hosts.iter().any(|h| h == host)
        });
    if !allowed {
        return Err(ApiError::BadRequest(format!(
            "Invalid next page: '{next}' is not on an allowed host"
        )));
    }
    Ok(target.to_string())
}

fn with_context(
    state: &AppState,
    jar: PrivateCookieJar,
    ctx: &SessionContext,
    response: impl IntoResponse,
) -> Result<Response, ApiError> {
    Ok((context::save(state, jar, ctx)?, response).into_response())
}

/// `GET /healthcheck`
pub async fn healthcheck() -> StatusCode {
    StatusCode::OK
}

/// `GET /`
pub async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    MaybeUser(user): MaybeUser,
) -> Result<Response, ApiError> {
    let (jar, mut ctx) = context::load(&state, &headers);
    let message = ctx.message.take();
    let body = Json(json!({
        "username": user.as_ref().map(|u| u.username()),
        "message": message,
    }));
    with_context(&state, jar, &ctx, body)
}

/// `GET /user`
pub async fn user_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
    MaybeUser(user): MaybeUser,
) -> Result<Response, ApiError> {
    let (jar, mut ctx) = context::load(&state, &headers);
    let message = ctx.message.take();
    let body = Json(json!({
        "cloud": state.config.oidc.cloud(),
        "user": user.as_ref().map(|u| u.user()),
        "next_page": query.next,
        "message": message,
    }));
    with_context(&state, jar, &ctx, body)
}

async fn begin_flow(
    state: &AppState,
    headers: &HeaderMap,
    next: Option<&str>,
    caller: FlowCaller,
) -> Result<Response, ApiError> {
    let next = validate_next(&state.config, next)?;
    let initiation = state
        .provider
        .initiate_flow(&state.config.external_url("/oauth2callback"))
        .map_err(ApiError::internal)?;

    let (jar, _) = context::load(state, headers);
    let ctx = SessionContext::for_flow(caller, next, initiation.flow);
    with_context(state, jar, &ctx, Redirect::to(&initiation.authorization_url))
}

/// `GET /login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
) -> Result<Response, ApiError> {
    begin_flow(&state, &headers, query.next.as_deref(), FlowCaller::Login).await
}

/// `GET /signup`
pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
) -> Result<Response, ApiError> {
    begin_flow(&state, &headers, query.next.as_deref(), FlowCaller::Signup).await
}

/// `GET /oauth2callback`
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let (jar, mut ctx) = context::load(&state, &headers);
    let Some(flow) = ctx.flow.take() else {
        return Err(ApiError::unauthorized("callback without a flow in progress"));
    };
    let caller = ctx.caller.unwrap_or(FlowCaller::Login);
    let next = validate_next(&state.config, ctx.next.as_deref())?;
    ctx.cleanup();

    let identity = state.provider.receive_callback(&params, &flow).await?;

    let users = UserRepository::new(state.db_pool.clone());
    let policy = state.config.accounts.reuse_policy();
    let Some(user) = users
        .find_holder_of_login_id(&identity.login_id, policy)
        .await?
    else {
        return match caller {
            FlowCaller::Login => {
                ctx.set_message(
                    format!("Account does not exist for login id {}", identity.login_id),
                    MessageKind::Error,
                );
                with_context(&state, jar, &ctx, Redirect::to(&state.config.external_url("/")))
            }
            FlowCaller::Signup => sign_up(&state, jar, ctx, identity, next).await,
        };
    };

    match user.state {
        AccountState::Deleting | AccountState::Deleted => {
            with_context(&state, jar, &ctx, Json(AccountStatus::of(&user)))
        }
        AccountState::Creating => {
            let mut ctx = SessionContext::pending(identity.login_id, Some(next));
            let text = match caller {
                FlowCaller::Signup => "Account is already being created",
                FlowCaller::Login => "Account is still being created",
            };
            ctx.set_message(text, MessageKind::Error);
            with_context(&state, jar, &ctx, Redirect::to(&state.config.external_url("/creating")))
        }
        AccountState::Active => {
            let session_id = SessionRepository::new(state.db_pool.clone())
                .create(user.id, Some(state.config.session.default_max_age_secs))
                .await?;
            let mut ctx = SessionContext::logged_in(session_id);
            if caller == FlowCaller::Signup {
                ctx.set_message(
                    format!("Account has already been created for {}.", user.username),
                    MessageKind::Info,
                );
            }
            info!(username = %user.username, "logged in");
            with_context(&state, jar, &ctx, Redirect::to(&next))
        }
    }
}

/// Creates the account for a first-time signup and sends the browser to
/// wait for it.
async fn sign_up(
    state: &AppState,
    jar: PrivateCookieJar,
    mut ctx: SessionContext,
    identity: VerifiedIdentity,
    next: String,
) -> Result<Response, ApiError> {
    let Some(email) = identity.unverified_email.as_deref() else {
        return Err(ApiError::unauthorized(
            AuthenticationError::MissingClaim {
                claim: "email".to_string(),
            }
            .to_string(),
        ));
    };
    let expected = state.provider.organization_id();
    if identity.organization_id.as_deref() != Some(expected) {
        return Err(ApiError::unauthorized(
            AuthenticationError::OrganizationMismatch {
                expected: expected.to_string(),
                actual: identity.organization_id.clone(),
            }
            .to_string(),
        ));
    }

    let new_user = NewUser::signup(username_from_email(email), identity.login_id.clone());
    match state.accounts().create_user(&new_user).await {
        Ok(_) => {}
        Err(AccountStoreError::Account(e)) => {
            ctx.set_message(e.to_string(), MessageKind::Error);
            return with_context(state, jar, &ctx, Redirect::to(&state.config.external_url("/")));
        }
        Err(e) => return Err(e.into()),
    }

    let ctx = SessionContext::pending(identity.login_id, Some(next));
    with_context(state, jar, &ctx, Redirect::to(&state.config.external_url("/creating")))
}

/// `GET /creating`
pub async fn creating(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (jar, mut ctx) = context::load(&state, &headers);
    let Some(login_id) = ctx.pending_login_id().map(str::to_string) else {
        return Err(ApiError::unauthorized("no account creation pending"));
    };
    let next = validate_next(&state.config, ctx.next.as_deref())?;
    ctx.cleanup();

    let users = UserRepository::new(state.db_pool.clone());
    let policy = state.config.accounts.reuse_policy();
    let Some(user) = users.find_holder_of_login_id(&login_id, policy).await? else {
        ctx.set_message(
            format!("Account does not exist for login id {login_id}."),
            MessageKind::Error,
        );
        return with_context(&state, jar, &ctx, Redirect::to(&state.config.external_url("/")));
    };

    match user.state {
        AccountState::Deleting | AccountState::Deleted => {
            with_context(&state, jar, &ctx, Json(AccountStatus::of(&user)))
        }
        AccountState::Active => {
            let session_id = SessionRepository::new(state.db_pool.clone())
                .create(user.id, Some(state.config.session.default_max_age_secs))
                .await?;
            let mut ctx = SessionContext::logged_in(session_id);
            ctx.set_message(
                format!("Account has been created for {}.", user.username),
                MessageKind::Info,
            );
            with_context(&state, jar, &ctx, Redirect::to(&next))
        }
        AccountState::Creating => {
            let ctx = SessionContext::pending(login_id, Some(next));
            with_context(&state, jar, &ctx, Json(AccountStatus::of(&user)))
        }
    }
}

/// `POST /logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (jar, mut ctx) = context::load(&state, &headers);
    if let Some(session_id) = ctx.session_id.take() {
        SessionRepository::new(state.db_pool.clone())
            .revoke(&session_id)
            .await?;
    }
    ctx.cleanup();
    with_context(&state, jar, &ctx, Redirect::to(&state.config.external_url("/")))
}

/// `POST /copy-paste-token`
pub async fn copy_paste_token(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Response, ApiError> {
    let Some(session_id) = user.session_id() else {
        return Err(ApiError::unauthorized(
            "copy-paste tokens require a session credential",
        ));
    };
    let token = CopyPasteTokenRepository::new(state.db_pool.clone())
        .issue(session_id, state.config.session.copy_paste_max_age_secs)
        .await?;
    Ok(Json(json!({ "copy_paste_token": token.as_str() })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ServerConfig {
        serde_json::from_value(json!({
            "database_url": "postgres://localhost/gatekeep",
            "external_url": "https://auth.example.org",
            "allowed_redirect_hosts": ["batch.example.org"],
            "oidc": {"cloud": "gcp", "client_id": "web", "client_secret": "secret"}
        }))
        .expect("deserialize")
    }

    #[test]
    fn next_defaults_to_user_page() {
        assert_eq!(
            validate_next(&config(), None).unwrap(),
            "https://auth.example.org/user"
        );
    }

    #[test]
    fn next_accepts_allowed_hosts_and_relative_paths() {
        let config = config();
        assert_eq!(
            validate_next(&config, Some("/creating")).unwrap(),
            "https://auth.example.org/creating"
        );
        assert_eq!(
            validate_next(&config, Some("https://batch.example.org/jobs")).unwrap(),
            "https://batch.example.org/jobs"
        );
    }

    #[test]
    fn next_rejects_foreign_hosts() {
        let config = config();
        for next in [
            "https://evil.example.com/",
            "//evil.example.com/x",
            "javascript:alert(1)",
            "",
        ] {
            assert!(
                matches!(validate_next(&config, Some(next)), Err(ApiError::BadRequest(_))),
                "{next} accepted"
            );
        }
    }
}
