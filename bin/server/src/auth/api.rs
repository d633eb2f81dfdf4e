//! REST API for the command-line tool and other services.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatekeep_core::UserId;
use gatekeep_platform_access::{CallbackParams, FlowState, NewUser, User};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    AppState, RequireDevOrServiceAccount, RequireDeveloper, RequireUser,
    db::{CopyPasteTokenRepository, RoleRepository, SessionRepository, UserRepository},
};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    callback_port: u16,
}

/// `GET /api/v1alpha/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let callback_uri = format!("http://127.0.0.1:{}/oauth2callback", query.callback_port);
    let initiation = state
        .provider
        .initiate_flow(&callback_uri)
        .map_err(ApiError::internal)?;

    Ok(Json(json!({
        "state": initiation.flow.state,
        "authorization_url": initiation.authorization_url,
        "flow": initiation.flow,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// JSON-encoded [`FlowState`] returned by `login`.
    flow: String,
    #[serde(flatten)]
    params: CallbackParams,
}

/// `GET /api/v1alpha/oauth2callback`
///
/// Sessions issued here never expire.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let flow: FlowState = serde_json::from_str(&query.flow)
        .map_err(|e| ApiError::unauthorized(format!("unreadable flow state: {e}")))?;
    let identity = state.provider.receive_callback(&query.params, &flow).await?;

    let mut users = UserRepository::new(state.db_pool.clone())
        .find_active_by_login_id(&identity.login_id)
        .await?;
    if users.len() != 1 {
        return Err(ApiError::unauthorized(format!(
            "{} active accounts for login id {}",
            users.len(),
            identity.login_id
        )));
    }
    let Some(user) = users.pop() else {
        return Err(ApiError::unauthorized("no active account"));
    };

    let session_id = SessionRepository::new(state.db_pool.clone())
        .create(user.id, None)
        .await?;
    info!(username = %user.username, "issued CLI session");

    Ok(Json(json!({ "token": session_id.as_str(), "username": user.username })).into_response())
}

/// `GET /api/v1alpha/oauth2-client`
pub async fn oauth2_client(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "idp": state.provider.kind(),
        "oauth2_client": state.config.oidc.cli_client(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CopyPasteLoginQuery {
    copy_paste_token: String,
}

/// `POST /api/v1alpha/copy-paste-login`
pub async fn copy_paste_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CopyPasteLoginQuery>,
) -> Result<Response, ApiError> {
    let redeemed = CopyPasteTokenRepository::new(state.db_pool.clone())
        .redeem(&query.copy_paste_token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unknown or expired copy-paste token"))?;

    Ok(Json(json!({ "token": redeemed.session_id, "username": redeemed.username })).into_response())
}

/// `POST /api/v1alpha/copy-paste-token`
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
    Ok(token.as_str().to_string().into_response())
}

#[derive(Debug, Serialize)]
struct UserInfo<'a> {
    #[serde(flatten)]
    user: &'a User,
    session_id: Option<&'a str>,
}

/// `GET /api/v1alpha/userinfo`
pub async fn userinfo(RequireUser(user): RequireUser) -> Response {
    Json(UserInfo {
        user: user.user(),
        session_id: user.session_id().map(|id| id.as_str()),
    })
    .into_response()
}

/// `GET /api/v1alpha/users`
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    RequireUser(caller): RequireUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let is_lister = state
        .config
        .accounts
        .user_listers
        .iter()
        .any(|name| name == caller.username());
    if !caller.user().is_developer && !is_lister {
        return Err(ApiError::unauthorized(format!(
            "user '{}' may not list users",
            caller.username()
        )));
    }

    Ok(Json(UserRepository::new(state.db_pool.clone()).list().await?))
}

/// `GET /api/v1alpha/users/{user}`
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _developer: RequireDeveloper,
    Path(username): Path<String>,
) -> Result<Json<User>, ApiError> {
    UserRepository::new(state.db_pool.clone())
        .find_by_username(&username)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// `POST /api/v1alpha/users/{user}/create`
#[instrument(skip(state, developer, body), fields(by = %developer.0.username()))]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    developer: RequireDeveloper,
    Path(username): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let new_user = NewUser::from_json(&username, &body)?;
    let created = state.accounts().create_user(&new_user).await?;
    if !created {
        info!("account already exists");
    }
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    id: Option<UserId>,
}

/// `DELETE /api/v1alpha/users/{user}`
#[instrument(skip(state, developer), fields(by = %developer.0.username()))]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    developer: RequireDeveloper,
    Path(username): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    state.accounts().delete_user(&username, query.id).await?;
    Ok(Json(json!({})))
}

/// `GET /api/v1alpha/roles`
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _developer: RequireDeveloper,
) -> Result<Response, ApiError> {
    let roles = RoleRepository::new(state.db_pool.clone()).list().await?;
    Ok(Json(roles).into_response())
}

#[derive(Debug, Deserialize)]
pub struct NewRole {
    name: String,
}

/// `POST /api/v1alpha/roles`
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    _developer: RequireDeveloper,
    Json(role): Json<NewRole>,
) -> Result<Response, ApiError> {
    let name = role.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("role name must not be empty".to_string()));
    }
    let role = RoleRepository::new(state.db_pool.clone())
        .create(name)
        .await?;
    Ok((StatusCode::CREATED, Json(role)).into_response())
}

/// `POST /api/v1alpha/invalidate_all_sessions`
pub async fn invalidate_all_sessions(
    State(state): State<Arc<AppState>>,
    RequireDeveloper(developer): RequireDeveloper,
) -> Result<StatusCode, ApiError> {
    let revoked = SessionRepository::new(state.db_pool.clone())
        .revoke_all_human_sessions()
        .await?;
    warn!(by = %developer.username(), revoked, "invalidated all human sessions");
    Ok(StatusCode::OK)
}

/// `POST /api/v1alpha/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<StatusCode, ApiError> {
    if let Some(session_id) = user.session_id() {
        SessionRepository::new(state.db_pool.clone())
            .revoke(session_id)
            .await?;
    }
    Ok(StatusCode::OK)
}

/// `* /api/v1alpha/verify_dev_credentials`
pub async fn verify_dev_credentials(_developer: RequireDeveloper) -> StatusCode {
    StatusCode::OK
}

/// `* /api/v1alpha/verify_dev_or_sa_credentials`
pub async fn verify_dev_or_sa_credentials(_caller: RequireDevOrServiceAccount) -> StatusCode {
    StatusCode::OK
}
