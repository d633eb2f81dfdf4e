use axum_extra::extract::cookie::Key;
use base64::Engine;
use gatekeep_platform_access::{Cloud, IdentityProvider};
use gatekeep_server::{
    auth::{
        AppState, AzureFlow, GoogleFlow, OidcClient,
        db::{CopyPasteTokenRepository, SessionRepository},
    },
    config::{ServerConfig, SessionConfig},
    router::router,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{error::Error, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn Error + Send + Sync>;

/// Deletes expired sessions and copy-paste tokens.
async fn cleanup_expired(pool: &PgPool) {
    match SessionRepository::new(pool.clone()).delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_sessions = count, "Cleaned up expired sessions");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions");
        }
    }
    match CopyPasteTokenRepository::new(pool.clone())
        .delete_expired()
        .await
    {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_tokens = count, "Cleaned up expired copy-paste tokens");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired copy-paste tokens");
        }
    }
}

fn cookie_key(session: &SessionConfig) -> Result<Key, BoxError> {
    match &session.cookie_secret {
        Some(secret) => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(secret.trim())?;
            Ok(Key::try_from(bytes.as_slice())?)
        }
        None => {
            tracing::warn!("SESSION__COOKIE_SECRET unset; browser sessions end on restart");
            Ok(Key::generate())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env()?;
    tracing::info!(namespace = %config.namespace, "Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    cleanup_expired(&db_pool).await;

    let cleanup_pool = db_pool.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            cleanup_expired(&cleanup_pool).await;
        }
    });

    let cookie_key = cookie_key(&config.session)?;

    tracing::info!(cloud = ?config.oidc.cloud(), "Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc.clone())
        .await
        .map_err(|e| format!("failed to discover OIDC provider: {e}"))?;
    let provider: Arc<dyn IdentityProvider> = match config.oidc.cloud() {
        Cloud::Gcp => Arc::new(GoogleFlow::new(oidc_client)),
        Cloud::Azure => Arc::new(AzureFlow::new(oidc_client)),
    };

    let addr = config.listen_addr.clone();
    let app_state = Arc::new(AppState::new(db_pool, provider, config, cookie_key));
    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
