//! The resolved caller of a request.

use crate::role::Requirement;
use crate::session::SessionId;
use crate::user::User;

/// Where the credential that identified a caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Trusted internal header, honored only in the default namespace.
    InternalHeader,
    /// `Authorization: Bearer` header.
    BearerHeader,
    /// Session id stored in the browser's context cookie.
    SessionCookie,
}

/// An account that presented a valid credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    user: User,
    session_id: Option<SessionId>,
    source: CredentialSource,
}

impl AuthenticatedUser {
    /// `session_id` is `None` when the caller used a provider access token.
    #[must_use]
    pub fn new(user: User, session_id: Option<SessionId>, source: CredentialSource) -> Self {
        Self {
            user,
            session_id,
            source,
        }
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.user.username
    }

    /// Returns the gateway session the caller authenticated with, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    #[must_use]
    pub fn satisfies(&self, requirement: Requirement) -> bool {
        requirement.is_met_by(&self.user)
    }
}
