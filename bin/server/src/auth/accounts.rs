//! Account creation and deletion.
//!
//! Creation reads every account sharing the candidate's username or login
//! id and decides inside one transaction. Transaction-scoped advisory locks
//! on both keys make a concurrent creation of the same name wait until the
//! first commits, after which it sees the committed row.

use gatekeep_core::UserId;
use gatekeep_platform_access::{AccountError, NewUser, Resolution, ReusePolicy, resolve_conflicts};
use sqlx::PgPool;
use tracing::{info, instrument};

use super::db::{UserRow, into_users};
use crate::error::AccountStoreError;

/// Applies the account lifecycle rules against the database.
pub struct AccountManager {
    pool: PgPool,
    policy: ReusePolicy,
    allow_identity_refs: bool,
}

impl AccountManager {
    /// `allow_identity_refs` admits existing identity references on new
    /// accounts; only test deployments set it.
    pub fn new(pool: PgPool, policy: ReusePolicy, allow_identity_refs: bool) -> Self {
        Self {
            pool,
            policy,
            allow_identity_refs,
        }
    }

    /// Creates an account in state `creating`.
    ///
    /// Returns `false` without modifying anything when the identical live
    /// account already exists.
    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create_user(&self, new_user: &NewUser) -> Result<bool, AccountStoreError> {
        new_user.validate()?;
        if new_user.has_identity_refs() && !self.allow_identity_refs {
            return Err(AccountError::IdentityRefsNotAllowed.into());
        }

        let mut tx = self.pool.begin().await?;

        let mut lock_keys = vec![format!("username:{}", new_user.username)];
        if let Some(login_id) = &new_user.login_id {
            lock_keys.push(format!("login_id:{login_id}"));
        }
        lock_keys.sort();
        for key in &lock_keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            WHERE username = $1 OR ($2::TEXT IS NOT NULL AND login_id = $2)
            FOR SHARE
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.login_id)
        .fetch_all(&mut *tx)
        .await?;
        let existing = into_users(rows)?;

        match resolve_conflicts(new_user, &existing, self.policy)? {
            Resolution::AlreadyExists => {
                tx.rollback().await?;
                Ok(false)
            }
            Resolution::Insert => {
                let id = UserId::new();
                sqlx::query(
                    r#"
                    INSERT INTO users (id, username, login_id, state, is_developer,
                                       is_service_account, hail_identity,
                                       hail_credentials_secret_name)
                    VALUES ($1, $2, $3, 'creating', $4, $5, $6, $7)
                    "#,
                )
                .bind(id.to_string())
                .bind(&new_user.username)
                .bind(&new_user.login_id)
                .bind(new_user.is_developer)
                .bind(new_user.is_service_account)
                .bind(&new_user.hail_identity)
                .bind(&new_user.hail_credentials_secret_name)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                info!(user_id = %id, "created account");
                Ok(true)
            }
        }
    }

    /// Moves a live account named `username` (and with `id`, if given) to
    /// `deleting`.
    ///
    /// Deleting an account that is already being deleted reports
    /// `UnknownUser`.
    #[instrument(skip(self))]
    pub async fn delete_user(
        &self,
        username: &str,
        id: Option<UserId>,
    ) -> Result<(), AccountStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET state = 'deleting'
            WHERE username = $1
              AND state NOT IN ('deleting', 'deleted')
              AND ($2::TEXT IS NULL OR id = $2)
            "#,
        )
        .bind(username)
        .bind(id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::UnknownUser {
                username: username.to_string(),
            }
            .into());
        }

        info!("marked account for deletion");
        Ok(())
    }
}
