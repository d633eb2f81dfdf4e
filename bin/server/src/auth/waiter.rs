//! Long-poll for a browser waiting on its account to be provisioned.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use gatekeep_platform_access::AccountState;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

use super::{AppState, context, db::UserRepository};
use crate::error::ApiError;

/// Re-reads the account state until it leaves `creating` or `max_polls`
/// re-reads have been made, sleeping `interval` before each re-read.
///
/// Returns the last state read; `None` if the account disappeared.
pub async fn wait_until_provisioned<F, Fut, E>(
    mut read_state: F,
    interval: Duration,
    max_polls: u32,
) -> Result<Option<AccountState>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<AccountState>, E>>,
{
    let mut state = read_state().await?;
    let mut polls = 0;
    while polls < max_polls && state == Some(AccountState::Creating) {
        tokio::time::sleep(interval).await;
        state = read_state().await?;
        polls += 1;
    }
    if state == Some(AccountState::Creating) {
        info!(polls, "account still being created after wait");
    }
    Ok(state)
}

/// Completes when the client closes the socket or the connection drops.
async fn client_gone(socket: &mut WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Close(_) = message {
            return;
        }
    }
}

/// `GET /creating/wait`
pub async fn creating_wait(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let (_, ctx) = context::load(&state, &headers);
    let Some(login_id) = ctx.pending_login_id().map(str::to_string) else {
        return Err(ApiError::unauthorized("no account creation pending"));
    };

    let users = UserRepository::new(state.db_pool.clone());
    let policy = state.config.accounts.reuse_policy();
    if users
        .find_holder_of_login_id(&login_id, policy)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound);
    }

    Ok(ws.on_upgrade(move |socket| report_when_provisioned(socket, state, login_id)))
}

#[instrument(skip(socket, state))]
async fn report_when_provisioned(mut socket: WebSocket, state: Arc<AppState>, login_id: String) {
    let users = UserRepository::new(state.db_pool.clone());
    let users = &users;
    let login_id = login_id.as_str();
    let waiter = &state.config.waiter;

    let poll = wait_until_provisioned(
        move || async move {
            let user = users.find_by_login_id(login_id).await?;
            Ok::<_, sqlx::Error>(user.map(|u| u.state))
        },
        waiter.poll_interval(),
        waiter.max_polls,
    );

    let outcome = tokio::select! {
        outcome = poll => outcome,
        () = client_gone(&mut socket) => {
            debug!("client left before provisioning finished");
            return;
        }
    };

    let active = match outcome {
        Ok(state) => state == Some(AccountState::Active),
        Err(e) => {
            warn!(error = %e, "failed to read account state");
            false
        }
    };

    let reply = if active { "1" } else { "0" };
    if let Err(e) = socket.send(Message::text(reply)).await {
        debug!(error = %e, "failed to send provisioning result");
        return;
    }
    let _ = socket.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn returns_once_account_is_active() {
        let reads = AtomicU32::new(0);
        let reads = &reads;
        let start = Instant::now();

        let state = wait_until_provisioned(
            move || async move {
                let n = reads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Some(if n < 3 {
                    AccountState::Creating
                } else {
                    AccountState::Active
                }))
            },
            Duration::from_secs(1),
            10,
        )
        .await
        .unwrap();

        assert_eq!(state, Some(AccountState::Active));
        assert_eq!(reads.load(Ordering::SeqCst), 4);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_polls() {
        let reads = AtomicU32::new(0);
        let reads = &reads;

        let state = wait_until_provisioned(
            move || async move {
                reads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Some(AccountState::Creating))
            },
            Duration::from_secs(1),
            10,
        )
        .await
        .unwrap();

        assert_eq!(state, Some(AccountState::Creating));
        assert_eq!(reads.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_accounts_do_not_sleep() {
        let start = Instant::now();
        let state = wait_until_provisioned(
            || async { Ok::<_, Infallible>(Some(AccountState::Deleting)) },
            Duration::from_secs(1),
            10,
        )
        .await
        .unwrap();

        assert_eq!(state, Some(AccountState::Deleting));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
