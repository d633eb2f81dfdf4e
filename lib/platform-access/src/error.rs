//! Error types for the platform-access crate.
//!
//! - `AccountError`: the closed taxonomy of account-lifecycle failures, each
//!   with a fixed [`AccountErrorKind`] the HTTP layer maps to a status.
//! - `AuthenticationError`: identity-federation failures. These are logged in
//!   full and surfaced to callers as a bare 401.
//! - `AuthorizationError`: a resolved caller that does not meet a route's
//!   requirement.

use std::fmt;

/// Coarse classification of an [`AccountError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountErrorKind {
    /// Malformed or policy-violating input.
    BadInput,
    /// The request collides with existing accounts.
    Conflict,
    /// The referenced account does not exist.
    NotFound,
}

/// Failures of account creation and deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// A request field had the wrong JSON type.
    InvalidType {
        field: String,
        value: String,
        expected: &'static str,
    },
    /// A human account was requested without a login id.
    EmptyLoginId { username: String },
    /// The username does not satisfy the username policy.
    InvalidUsername { username: String },
    /// Both developer and service-account roles were requested.
    MultipleUserTypes { username: String },
    /// The username already belongs to an account with a different login id.
    DuplicateLoginId {
        existing_username: String,
        login_id: Option<String>,
    },
    /// The login id already belongs to an account with a different username.
    DuplicateUsername {
        username: String,
        existing_username: String,
    },
    /// Username and login id match two different accounts.
    MultipleExistingUsers {
        username: String,
        login_id: Option<String>,
    },
    /// The account exists but has been deleted or is being deleted.
    PreviouslyDeletedUser { username: String },
    /// No live account matches.
    UnknownUser { username: String },
    /// The credentials secret name is not a valid DNS subdomain.
    InvalidCredentialsSecretName { name: String },
    /// Existing identity references were supplied outside a test deployment.
    IdentityRefsNotAllowed,
}

impl AccountError {
    /// Returns the kind used to pick the response status.
    #[must_use]
    pub fn kind(&self) -> AccountErrorKind {
        match self {
            Self::InvalidType { .. }
            | Self::EmptyLoginId { .. }
            | Self::InvalidUsername { .. }
            | Self::MultipleUserTypes { .. }
            | Self::InvalidCredentialsSecretName { .. }
            | Self::IdentityRefsNotAllowed => AccountErrorKind::BadInput,
            Self::DuplicateLoginId { .. }
            | Self::DuplicateUsername { .. }
            | Self::MultipleExistingUsers { .. }
            | Self::PreviouslyDeletedUser { .. } => AccountErrorKind::Conflict,
            Self::UnknownUser { .. } => AccountErrorKind::NotFound,
        }
    }
}

fn display_login_id(login_id: &Option<String>) -> &str {
    login_id.as_deref().unwrap_or("<none>")
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidType {
                field,
                value,
                expected,
            } => {
                write!(f, "expected '{field}' to be of type {expected}, got {value}")
            }
            Self::EmptyLoginId { username } => {
                write!(f, "login id cannot be empty for user '{username}'")
            }
            Self::InvalidUsername { username } => {
                write!(f, "invalid username '{username}'")
            }
            Self::MultipleUserTypes { username } => {
                write!(
                    f,
                    "user '{username}' cannot be both a developer and a service account"
                )
            }
            Self::DuplicateLoginId {
                existing_username,
                login_id,
            } => {
                write!(
                    f,
                    "user '{existing_username}' already exists with a different login id than {}",
                    display_login_id(login_id)
                )
            }
            Self::DuplicateUsername {
                username,
                existing_username,
            } => {
                write!(
                    f,
                    "login id for '{username}' already belongs to user '{existing_username}'"
                )
            }
            Self::MultipleExistingUsers { username, login_id } => {
                write!(
                    f,
                    "username '{username}' and login id {} match different existing users",
                    display_login_id(login_id)
                )
            }
            Self::PreviouslyDeletedUser { username } => {
                write!(f, "user '{username}' was previously deleted and cannot be reused")
            }
            Self::UnknownUser { username } => {
                write!(f, "unknown user '{username}'")
            }
            Self::InvalidCredentialsSecretName { name } => {
                write!(f, "invalid credentials secret name '{name}'")
            }
            Self::IdentityRefsNotAllowed => {
                write!(f, "cannot specify an existing identity for a new user")
            }
        }
    }
}

impl std::error::Error for AccountError {}

/// Errors from identity federation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The provider answered the authorization request with an error.
    ProviderError { provider: String, reason: String },
    /// The callback `state` does not match the one issued with the flow.
    StateMismatch,
    /// Exchanging the authorization code failed.
    TokenExchange { reason: String },
    /// Signature, audience, issuer, or nonce verification failed.
    InvalidToken { reason: String },
    /// A required claim was absent from a verified token.
    MissingClaim { claim: String },
    /// The identity belongs to another tenant or hosted domain.
    OrganizationMismatch {
        expected: String,
        actual: Option<String>,
    },
    /// Talking to the provider failed at the transport level.
    Network { reason: String },
    /// The provider client is misconfigured.
    Configuration { reason: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderError { provider, reason } => {
                write!(f, "identity provider '{provider}' returned an error: {reason}")
            }
            Self::StateMismatch => write!(f, "oauth2 state mismatch"),
            Self::TokenExchange { reason } => write!(f, "token exchange failed: {reason}"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
            Self::OrganizationMismatch { expected, actual } => write!(
                f,
                "identity belongs to organization {} instead of {expected}",
                actual.as_deref().unwrap_or("<none>")
            ),
            Self::Network { reason } => write!(f, "identity provider unreachable: {reason}"),
            Self::Configuration { reason } => {
                write!(f, "identity provider misconfigured: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from role checks on a resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No usable credential was presented.
    NotAuthenticated,
    /// The caller resolved but lacks the role the route requires.
    RequirementNotMet {
        username: String,
        requirement: &'static str,
    },
    /// A provider identity matched more than one active account.
    AmbiguousIdentity { matches: usize },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "caller is not authenticated"),
            Self::RequirementNotMet {
                username,
                requirement,
            } => write!(f, "user '{username}' does not satisfy requirement '{requirement}'"),
            Self::AmbiguousIdentity { matches } => {
                write!(f, "identity matched {matches} active users")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_bad_input() {
        let err = AccountError::InvalidUsername {
            username: "Bad!".to_string(),
        };
        assert_eq!(err.kind(), AccountErrorKind::BadInput);
        assert!(err.to_string().contains("Bad!"));
        assert_eq!(
            AccountError::IdentityRefsNotAllowed.kind(),
            AccountErrorKind::BadInput
        );
    }

    #[test]
    fn conflicts_carry_context() {
        let err = AccountError::DuplicateUsername {
            username: "alice2".to_string(),
            existing_username: "alice".to_string(),
        };
        assert_eq!(err.kind(), AccountErrorKind::Conflict);
        assert!(err.to_string().contains("alice2"));
        assert!(err.to_string().contains("'alice'"));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let err = AccountError::UnknownUser {
            username: "bob".to_string(),
        };
        assert_eq!(err.kind(), AccountErrorKind::NotFound);
    }

    #[test]
    fn missing_login_id_renders_placeholder() {
        let err = AccountError::MultipleExistingUsers {
            username: "svc".to_string(),
            login_id: None,
        };
        assert!(err.to_string().contains("<none>"));
    }

    #[test]
    fn organization_mismatch_display() {
        let err = AuthenticationError::OrganizationMismatch {
            expected: "example.org".to_string(),
            actual: Some("evil.org".to_string()),
        };
        assert!(err.to_string().contains("evil.org"));
        assert!(err.to_string().contains("example.org"));
    }

    #[test]
    fn requirement_not_met_display() {
        let err = AuthorizationError::RequirementNotMet {
            username: "alice".to_string(),
            requirement: "developer",
        };
        assert!(err.to_string().contains("developer"));
    }
}
