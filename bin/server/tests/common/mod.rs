//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use axum_extra::extract::cookie::Key;
use gatekeep_platform_access::{
    AuthenticationError, CallbackParams, FlowInitiation, FlowState, IdentityProvider, ProviderKind,
    VerifiedIdentity, federation::authorization_code,
};
use gatekeep_server::{auth::AppState, config::ServerConfig, router::router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower::ServiceExt;

/// State every flow started by [`FakeProvider`] carries.
pub const FLOW_STATE: &str = "state-1";

/// In-memory identity provider.
///
/// Callbacks echoing [`FLOW_STATE`] complete as `identity`, if one is set.
/// Access tokens resolve through `access_tokens`.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    pub identity: Option<VerifiedIdentity>,
    pub access_tokens: HashMap<String, String>,
}

impl FakeProvider {
    /// Provider whose flows complete as a member of `example.org`.
    pub fn signing_in(login_id: &str, email: &str) -> Self {
        Self {
            identity: Some(VerifiedIdentity {
                login_id: login_id.to_string(),
                unverified_email: Some(email.to_string()),
                organization_id: Some("example.org".to_string()),
            }),
            ..Self::default()
        }
    }

    pub fn with_access_token(mut self, token: &str, uid: &str) -> Self {
        self.access_tokens.insert(token.to_string(), uid.to_string());
        self
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn organization_id(&self) -> &str {
        "example.org"
    }

    fn initiate_flow(
        &self,
        callback_uri: &str,
    ) -> gatekeep_core::Result<FlowInitiation, AuthenticationError> {
        Ok(FlowInitiation {
            authorization_url: format!("https://idp.example.org/auth?redirect_uri={callback_uri}"),
            flow: FlowState {
                state: FLOW_STATE.to_string(),
                nonce: "nonce-1".to_string(),
                pkce_verifier: "verifier-1".to_string(),
                callback_uri: callback_uri.to_string(),
            },
        })
    }

    async fn receive_callback(
        &self,
        params: &CallbackParams,
        flow: &FlowState,
    ) -> gatekeep_core::Result<VerifiedIdentity, AuthenticationError> {
        authorization_code(self.kind(), params, flow)?;
        self.identity.clone().ok_or_else(|| {
            AuthenticationError::TokenExchange {
                reason: "no identity configured".to_string(),
            }
            .into()
        })
    }

    async fn get_identity_uid_from_access_token(
        &self,
        access_token: &str,
    ) -> gatekeep_core::Result<Option<String>, AuthenticationError> {
        Ok(self.access_tokens.get(access_token).cloned())
    }
}

pub fn test_config() -> ServerConfig {
    serde_json::from_value(json!({
        "database_url": "postgres://gatekeep@localhost/gatekeep",
        "external_url": "https://auth.example.org",
        "oidc": {
            "cloud": "gcp",
            "client_id": "web",
            "client_secret": "secret",
            "organization_id": "example.org",
            "cli_client_id": "cli"
        },
        "session": { "secure_cookies": false }
    }))
    .expect("test config")
}

pub fn app_with(pool: PgPool, provider: FakeProvider, config: ServerConfig) -> Router {
    let state = AppState::new(pool, Arc::new(provider), config, Key::generate());
    router(Arc::new(state))
}

pub fn app_with_pool(pool: PgPool) -> Router {
    app_with(pool, FakeProvider::default(), test_config())
}

fn unreachable_pool() -> PgPool {
    PgPoolOptions::new()
        .connect_lazy("postgres://gatekeep@localhost:1/unreachable")
        .expect("lazy pool")
}

/// Router over a pool that never connects; only routes that stay off the
/// database may be exercised with it.
pub fn app_without_database() -> Router {
    app_with_pool(unreachable_pool())
}

/// Like [`app_without_database`], with a custom provider and config.
pub fn app_without_database_with(provider: FakeProvider, config: ServerConfig) -> Router {
    app_with(unreachable_pool(), provider, config)
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("infallible")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Returns the `name=value` pair a response sets for cookie `name`.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|c| c.split(';').next())
        .find(|pair| pair.starts_with(&prefix))
        .map(str::to_string)
}

/// Runs the browser signup flow and returns the response of the callback.
pub async fn sign_up_through_browser(app: &Router) -> Response<Body> {
    let started = send(app.clone(), get("/signup")).await;
    let context = cookie_pair(&started, "session").expect("context cookie");

    let callback = Request::builder()
        .uri(format!("/oauth2callback?code=code-1&state={FLOW_STATE}"))
        .header(header::COOKIE, context)
        .body(Body::empty())
        .unwrap();
    send(app.clone(), callback).await
}

/// Serves `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
