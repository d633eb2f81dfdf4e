//! Conflict resolution for account creation.
//!
//! The store reads every account whose username or login id matches the
//! candidate while holding a lock that blocks concurrent writers, then asks
//! [`resolve_conflicts`] what to do. Keeping the decision pure lets it be
//! tested without a database.

use crate::error::AccountError;
use crate::user::{AccountState, NewUser, User};

/// What the store should do with a creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No conflicting account: insert in state `creating`.
    Insert,
    /// The identical live account already exists: change nothing.
    AlreadyExists,
}

/// Policy for names that belonged to accounts now in `deleted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReusePolicy {
    /// When true, `deleted` rows no longer block their username or login id.
    /// `deleting` rows always block.
    pub reuse_purged_identities: bool,
}

impl ReusePolicy {
    /// Returns true while `user` still holds its username and login id.
    #[must_use]
    pub fn blocks(&self, user: &User) -> bool {
        !(self.reuse_purged_identities && user.state == AccountState::Deleted)
    }
}

/// Decides the outcome of creating `candidate` given the matching rows.
///
/// # Errors
///
/// - `MultipleExistingUsers` when more than one account matches
/// - `DuplicateLoginId` when the username matches with another login id
/// - `DuplicateUsername` when the login id matches with another username
/// - `PreviouslyDeletedUser` when both match an account being or already deleted
pub fn resolve_conflicts(
    candidate: &NewUser,
    existing: &[User],
    policy: ReusePolicy,
) -> Result<Resolution, AccountError> {
    let blocking: Vec<&User> = existing.iter().filter(|u| policy.blocks(u)).collect();

    match blocking.as_slice() {
        [] => Ok(Resolution::Insert),
        [user] => {
            if user.username == candidate.username && user.login_id != candidate.login_id {
                return Err(AccountError::DuplicateLoginId {
                    existing_username: user.username.clone(),
                    login_id: candidate.login_id.clone(),
                });
            }
            if user.username != candidate.username {
                return Err(AccountError::DuplicateUsername {
                    username: candidate.username.clone(),
                    existing_username: user.username.clone(),
                });
            }
            if user.state.is_deleted() {
                return Err(AccountError::PreviouslyDeletedUser {
                    username: candidate.username.clone(),
                });
            }
            Ok(Resolution::AlreadyExists)
        }
        _ => Err(AccountError::MultipleExistingUsers {
            username: candidate.username.clone(),
            login_id: candidate.login_id.clone(),
        }),
    }
}
