//! Database repositories for accounts, sessions, copy-paste tokens, and roles.

use chrono::{DateTime, Utc};
use gatekeep_core::{RoleId, UserId};
use gatekeep_platform_access::{
    AccountState, CopyPasteToken, ReusePolicy, Role, SessionId, User,
    token::{generate_copy_paste_token, generate_session_id},
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// Row type for account queries.
#[derive(FromRow)]
pub(super) struct UserRow {
    id: String,
    username: String,
    login_id: Option<String>,
    state: String,
    is_developer: bool,
    is_service_account: bool,
    hail_identity: Option<String>,
    hail_identity_uid: Option<String>,
    hail_credentials_secret_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    pub(super) fn try_into_user(self) -> Result<User, sqlx::Error> {
        let id = UserId::from_str(&self.id)
            .map_err(|e| decode_error(format!("invalid user id '{}': {}", self.id, e)))?;
        let state = AccountState::from_str(&self.state).map_err(decode_error)?;
        Ok(User {
            id,
            username: self.username,
            login_id: self.login_id,
            state,
            is_developer: self.is_developer,
            is_service_account: self.is_service_account,
            hail_identity: self.hail_identity,
            hail_identity_uid: self.hail_identity_uid,
            hail_credentials_secret_name: self.hail_credentials_secret_name,
            created_at: self.created_at,
        })
    }
}

pub(super) fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>, sqlx::Error> {
    rows.into_iter().map(UserRow::try_into_user).collect()
}

/// Repository for account lookups. Writes go through
/// [`AccountManager`](super::accounts::AccountManager).
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the account holding `login_id`, preferring one not yet deleted.
    pub async fn find_by_login_id(&self, login_id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            WHERE login_id = $1
            ORDER BY (state = 'deleted'), created_at DESC
            LIMIT 1
            "#,
        )
        .bind(login_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::try_into_user).transpose()
    }

    /// Finds the account that still holds `login_id` under `policy`.
    ///
    /// A purged account the policy releases reads as absent, so its owner
    /// can sign up again.
    pub async fn find_holder_of_login_id(
        &self,
        login_id: &str,
        policy: ReusePolicy,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .find_by_login_id(login_id)
            .await?
            .filter(|user| policy.blocks(user)))
    }

    /// Finds the account named `username`, preferring one not yet deleted.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            WHERE username = $1
            ORDER BY (state = 'deleted'), created_at DESC
            LIMIT 1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::try_into_user).transpose()
    }

    /// Returns every active account whose login id is `login_id`.
    pub async fn find_active_by_login_id(&self, login_id: &str) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            WHERE login_id = $1 AND state = 'active'
            "#,
        )
        .bind(login_id)
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }

    /// Returns every active account whose login id or provisioned identity
    /// uid is `uid`.
    pub async fn find_active_by_identity_uid(&self, uid: &str) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            WHERE (login_id = $1 OR hail_identity_uid = $1) AND state = 'active'
            "#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }

    /// Lists all accounts.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, login_id, state, is_developer, is_service_account,
                   hail_identity, hail_identity_uid, hail_credentials_secret_name, created_at
            FROM users
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        into_users(rows)
    }
}

/// Repository for session operations.
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a session for `user_id`. `None` never expires.
    pub async fn create(
        &self,
        user_id: UserId,
        max_age_secs: Option<i64>,
    ) -> Result<SessionId, sqlx::Error> {
        let session_id = generate_session_id();

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, max_age_secs)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(session_id.as_str())
        .bind(user_id.to_string())
        .bind(max_age_secs)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    /// Resolves a credential to the active owner of a valid session.
    ///
    /// Credentials that cannot be session ids return `None` without a
    /// database round trip.
    pub async fn resolve(&self, credential: &str) -> Result<Option<User>, sqlx::Error> {
        if !SessionId::has_session_shape(credential) {
            return Ok(None);
        }

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.login_id, u.state, u.is_developer, u.is_service_account,
                   u.hail_identity, u.hail_identity_uid, u.hail_credentials_secret_name, u.created_at
            FROM users u
            INNER JOIN sessions s ON s.user_id = u.id
            WHERE s.session_id = $1
              AND u.state = 'active'
              AND (s.max_age_secs IS NULL
                   OR NOW() < s.created + s.max_age_secs * INTERVAL '1 second')
            "#,
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::try_into_user).transpose()
    }

    /// Deletes a session (logout). Deleting an unknown session is a no-op.
    pub async fn revoke(&self, id: &SessionId) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every session owned by a human account.
    pub async fn revoke_all_human_sessions(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions s
            USING users u
            WHERE s.user_id = u.id AND NOT u.is_service_account
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes expired sessions.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE max_age_secs IS NOT NULL
              AND created + max_age_secs * INTERVAL '1 second' <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Session and owner released by redeeming a copy-paste token.
#[derive(Debug, FromRow)]
pub struct RedeemedToken {
    pub session_id: String,
    pub username: String,
}

/// Repository for copy-paste tokens.
pub struct CopyPasteTokenRepository {
    pool: PgPool,
}

impl CopyPasteTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Issues a token for `session_id` valid for `max_age_secs`.
    pub async fn issue(
        &self,
        session_id: &SessionId,
        max_age_secs: i64,
    ) -> Result<CopyPasteToken, sqlx::Error> {
        let token = generate_copy_paste_token();

        sqlx::query(
            r#"
            INSERT INTO copy_paste_tokens (id, session_id, max_age_secs)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token.as_str())
        .bind(session_id.as_str())
        .bind(max_age_secs)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Redeems a token at most once.
    ///
    /// The token row is locked, checked against its expiry and its owner's
    /// state, and deleted in one transaction. A concurrent redemption waits
    /// on the lock and then finds no row. Unknown, expired, and already
    /// redeemed tokens all return `None`.
    pub async fn redeem(&self, token: &str) -> Result<Option<RedeemedToken>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let redeemed: Option<RedeemedToken> = sqlx::query_as(
            r#"
            SELECT s.session_id, u.username
            FROM copy_paste_tokens t
            INNER JOIN sessions s ON s.session_id = t.session_id
            INNER JOIN users u ON u.id = s.user_id
            WHERE t.id = $1
              AND NOW() < t.created + t.max_age_secs * INTERVAL '1 second'
              AND u.state = 'active'
            FOR UPDATE OF t
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        if redeemed.is_some() {
            sqlx::query(
                r#"
                DELETE FROM copy_paste_tokens
                WHERE id = $1
                "#,
            )
            .bind(token)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(redeemed)
    }

    /// Deletes expired tokens.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM copy_paste_tokens
            WHERE created + max_age_secs * INTERVAL '1 second' <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, sqlx::Error> {
        let id = RoleId::from_str(&self.id)
            .map_err(|e| decode_error(format!("invalid role id '{}': {}", self.id, e)))?;
        Ok(Role {
            id,
            name: self.name,
            created_at: self.created_at,
        })
    }
}

/// Repository for the role reference table.
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Role>, sqlx::Error> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT id, name, created_at
            FROM roles
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RoleRow::try_into_role).collect()
    }

    pub async fn create(&self, name: &str) -> Result<Role, sqlx::Error> {
        let row: RoleRow = sqlx::query_as(
            r#"
            INSERT INTO roles (id, name)
            VALUES ($1, $2)
            RETURNING id, name, created_at
            "#,
        )
        .bind(RoleId::new().to_string())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        row.try_into_role()
    }
}
