//! HTTP-facing error type.
//!
//! Handlers return `Result<_, ApiError>`. Each variant has one status code;
//! causes of authentication failures and internal faults are logged here
//! and never sent to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatekeep_platform_access::{AccountError, AccountErrorKind, AuthenticationError};
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors from account store operations.
#[derive(Debug)]
pub enum AccountStoreError {
    /// The request violates an account rule.
    Account(AccountError),
    /// The database failed.
    Database(sqlx::Error),
}

impl fmt::Display for AccountStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(e) => write!(f, "{e}"),
            Self::Database(e) => write!(f, "account store database error: {e}"),
        }
    }
}

impl std::error::Error for AccountStoreError {}

impl From<AccountError> for AccountStoreError {
    fn from(e: AccountError) -> Self {
        Self::Account(e)
    }
}

impl From<sqlx::Error> for AccountStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a message the client may see.
    BadRequest(String),
    /// 401. The cause is logged only.
    Unauthorized(String),
    /// 403. The cause is logged only.
    Forbidden(String),
    /// 404.
    NotFound,
    /// An account rule was violated; status follows the error kind.
    Account(AccountError),
    /// 500. The cause is logged only.
    Internal(String),
}

impl ApiError {
    /// 401 for a caller that could not be identified.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// 500 for a fault the client cannot fix.
    pub fn internal(reason: impl fmt::Display) -> Self {
        Self::Internal(reason.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Unauthorized(reason) => write!(f, "unauthorized: {reason}"),
            Self::Forbidden(reason) => write!(f, "forbidden: {reason}"),
            Self::NotFound => write!(f, "not found"),
            Self::Account(e) => write!(f, "{e}"),
            Self::Internal(reason) => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        Self::Account(e)
    }
}

impl From<AccountStoreError> for ApiError {
    fn from(e: AccountStoreError) -> Self {
        match e {
            AccountStoreError::Account(e) => Self::Account(e),
            AccountStoreError::Database(e) => Self::internal(e),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::internal(e)
    }
}

impl From<Report<AuthenticationError>> for ApiError {
    fn from(report: Report<AuthenticationError>) -> Self {
        Self::Unauthorized(format!("{report}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(reason) => {
                tracing::warn!(%reason, "request unauthorized");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::Forbidden(reason) => {
                tracing::warn!(%reason, "request forbidden");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            Self::Account(e) => {
                let status = match e.kind() {
                    AccountErrorKind::BadInput | AccountErrorKind::Conflict => {
                        StatusCode::BAD_REQUEST
                    }
                    AccountErrorKind::NotFound => StatusCode::NOT_FOUND,
                };
                (status, e.to_string())
            }
            Self::Internal(reason) => {
                tracing::error!(%reason, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_errors_map_by_kind() {
        let conflict = ApiError::from(AccountError::PreviouslyDeletedUser {
            username: "bob".to_string(),
        });
        assert_eq!(conflict.into_response().status(), StatusCode::BAD_REQUEST);

        let missing = ApiError::from(AccountError::UnknownUser {
            username: "bob".to_string(),
        });
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_database_errors_are_internal() {
        let err = ApiError::from(AccountStoreError::Database(sqlx::Error::RowNotFound));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_hides_cause() {
        let response = ApiError::unauthorized("signature mismatch").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
