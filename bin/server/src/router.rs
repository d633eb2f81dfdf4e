//! Route table.
//!
//! CSRF runs as a route layer, so it sees the matched route template and
//! runs before any authorization extractor.

use axum::{
    Router, middleware,
    routing::{any, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, api, csrf, routes, waiter};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Browser
        .route("/", get(routes::index))
        .route("/healthcheck", get(routes::healthcheck))
        .route("/user", get(routes::user_page))
        .route("/login", get(routes::login))
        .route("/signup", get(routes::signup))
        .route("/oauth2callback", get(routes::callback))
        .route("/creating", get(routes::creating))
        .route("/creating/wait", get(waiter::creating_wait))
        .route("/logout", post(routes::logout))
        .route("/copy-paste-token", post(routes::copy_paste_token))
        // API
        .route("/api/v1alpha/login", get(api::login))
        .route("/api/v1alpha/oauth2callback", get(api::callback))
        .route("/api/v1alpha/oauth2-client", get(api::oauth2_client))
        .route("/api/v1alpha/copy-paste-login", post(api::copy_paste_login))
        .route("/api/v1alpha/copy-paste-token", post(api::copy_paste_token))
        .route("/api/v1alpha/userinfo", get(api::userinfo))
        .route("/api/v1alpha/users", get(api::list_users))
        .route(
            "/api/v1alpha/users/{user}",
            get(api::get_user).delete(api::delete_user),
        )
        .route("/api/v1alpha/users/{user}/create", post(api::create_user))
        .route("/api/v1alpha/roles", get(api::list_roles).post(api::create_role))
        .route(
            "/api/v1alpha/invalidate_all_sessions",
            post(api::invalidate_all_sessions),
        )
        .route("/api/v1alpha/logout", post(api::logout))
        .route(
            "/api/v1alpha/verify_dev_credentials",
            any(api::verify_dev_credentials),
        )
        .route(
            "/api/v1alpha/verify_dev_or_sa_credentials",
            any(api::verify_dev_or_sa_credentials),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            csrf::csrf_protect,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
