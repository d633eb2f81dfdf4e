//! Authentication and session issuance for the gatekeep server.
//!
//! This module provides:
//! - identity federation with the configured OIDC provider
//! - database-backed sessions, copy-paste tokens and accounts
//! - the encrypted cookie session context
//! - authorization extractors and CSRF middleware for Axum routes
//! - browser (`routes`) and CLI (`api`) handlers
//!
//! # Credentials
//!
//! A request is identified by the first credential present among the
//! internal authorization header (trusted deployments only), a bearer
//! `Authorization` header, and the session id in the context cookie. Unmet
//! requirements are always answered with 401.

pub mod accounts;
pub mod api;
pub mod context;
pub mod csrf;
pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;
pub mod waiter;

use crate::config::ServerConfig;
use axum_extra::extract::cookie::Key;
use gatekeep_platform_access::IdentityProvider;
use sqlx::PgPool;
use std::sync::Arc;

pub use accounts::AccountManager;
pub use middleware::{MaybeUser, RequireDevOrServiceAccount, RequireDeveloper, RequireUser};
pub use oidc::{AzureFlow, GoogleFlow, OidcClient};

/// Shared application state.
pub struct AppState {
    /// Database connection pool.
    pub db_pool: PgPool,
    /// Identity provider selected at startup.
    pub provider: Arc<dyn IdentityProvider>,
    pub config: ServerConfig,
    /// Key encrypting the session context cookie.
    pub cookie_key: Key,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        db_pool: PgPool,
        provider: Arc<dyn IdentityProvider>,
        config: ServerConfig,
        cookie_key: Key,
    ) -> Self {
        Self {
            db_pool,
            provider,
            config,
            cookie_key,
        }
    }

    /// Account manager using the configured lifecycle policy.
    pub fn accounts(&self) -> AccountManager {
        AccountManager::new(
            self.db_pool.clone(),
            self.config.accounts.reuse_policy(),
            self.config.is_test_deployment(),
        )
    }
}
