//! Access requirements and the role reference table.
//!
//! Authorization is decided from the account flags alone. The `roles` table
//! is kept for reference and is never consulted by a check.

use chrono::{DateTime, Utc};
use gatekeep_core::RoleId;
use serde::Serialize;

use crate::user::User;

/// What a route demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// Any active account.
    Authenticated,
    /// An active developer account.
    Developer,
    /// An active developer or service account.
    DeveloperOrServiceAccount,
}

impl Requirement {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Developer => "developer",
            Self::DeveloperOrServiceAccount => "developer_or_service_account",
        }
    }

    /// Returns true if `user` satisfies this requirement.
    #[must_use]
    pub fn is_met_by(&self, user: &User) -> bool {
        user.is_active()
            && match self {
                Self::Authenticated => true,
                Self::Developer => user.is_developer,
                Self::DeveloperOrServiceAccount => user.is_developer || user.is_service_account,
            }
    }
}

/// A row of the role reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::AccountState;
    use gatekeep_core::UserId;

    fn user(is_developer: bool, is_service_account: bool, state: AccountState) -> User {
        User {
            id: UserId::new(),
            username: "alice".to_string(),
            login_id: (!is_service_account).then(|| "sub".to_string()),
            state,
            is_developer,
            is_service_account,
            hail_identity: None,
            hail_identity_uid: None,
            hail_credentials_secret_name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn plain_user_is_only_authenticated() {
        let u = user(false, false, AccountState::Active);
        assert!(Requirement::Authenticated.is_met_by(&u));
        assert!(!Requirement::Developer.is_met_by(&u));
        assert!(!Requirement::DeveloperOrServiceAccount.is_met_by(&u));
    }

    #[test]
    fn developer_meets_everything() {
        let u = user(true, false, AccountState::Active);
        assert!(Requirement::Developer.is_met_by(&u));
        assert!(Requirement::DeveloperOrServiceAccount.is_met_by(&u));
    }

    #[test]
    fn service_account_is_not_developer() {
        let u = user(false, true, AccountState::Active);
        assert!(!Requirement::Developer.is_met_by(&u));
        assert!(Requirement::DeveloperOrServiceAccount.is_met_by(&u));
    }

    #[test]
    fn inactive_accounts_meet_nothing() {
        for state in [
            AccountState::Creating,
            AccountState::Deleting,
            AccountState::Deleted,
        ] {
            let u = user(true, false, state);
            assert!(!Requirement::Authenticated.is_met_by(&u));
            assert!(!Requirement::Developer.is_met_by(&u));
        }
    }
}
