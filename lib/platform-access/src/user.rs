//! Account records and the rules for creating new ones.
//!
//! An account is either a human user, identified at the identity provider
//! by `login_id`, or a service account without one. Developers and service
//! accounts are mutually exclusive.

use chrono::{DateTime, Utc};
use gatekeep_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::AccountError;

/// Maximum username length.
const USERNAME_MAX_LEN: usize = 15;

/// Maximum length of a DNS subdomain name.
const SECRET_NAME_MAX_LEN: usize = 253;

/// Lifecycle state of an account.
///
/// `creating -> active -> deleting -> deleted`, plus `creating -> deleting`.
/// The gateway itself only ever writes `creating` and `deleting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Creating,
    Active,
    Deleting,
    Deleted,
}

impl AccountState {
    /// Returns the persisted form of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// Returns true for `deleting` and `deleted`.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "active" => Ok(Self::Active),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown account state '{other}'")),
        }
    }
}

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Subject identifier at the identity provider; absent for service accounts.
    pub login_id: Option<String>,
    pub state: AccountState,
    pub is_developer: bool,
    pub is_service_account: bool,
    /// Opaque reference to the provisioned cloud identity.
    pub hail_identity: Option<String>,
    /// Provider-side unique id of the provisioned identity, written by the
    /// provisioning worker.
    pub hail_identity_uid: Option<String>,
    pub hail_credentials_secret_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Returns true when the account may authenticate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == AccountState::Active
    }
}

/// A validated request to create an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub login_id: Option<String>,
    pub is_developer: bool,
    pub is_service_account: bool,
    pub hail_identity: Option<String>,
    pub hail_credentials_secret_name: Option<String>,
}

impl NewUser {
    /// The account a self-service signup creates: a plain human user.
    #[must_use]
    pub fn signup(username: String, login_id: String) -> Self {
        Self {
            username,
            login_id: Some(login_id),
            is_developer: false,
            is_service_account: false,
            hail_identity: None,
            hail_credentials_secret_name: None,
        }
    }

    /// Reads a creation request from an untyped JSON body.
    ///
    /// Only JSON types are checked here; [`NewUser::validate`] applies the
    /// account rules. A missing key reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidType` for the first field with the
    /// wrong type.
    pub fn from_json(username: &str, body: &Value) -> Result<Self, AccountError> {
        let null = Value::Null;
        let field = |name: &str| body.get(name).unwrap_or(&null);

        Ok(Self {
            username: username.to_string(),
            login_id: optional_str("login_id", field("login_id"))?,
            is_developer: required_bool("is_developer", field("is_developer"))?,
            is_service_account: required_bool("is_service_account", field("is_service_account"))?,
            hail_identity: optional_str("hail_identity", field("hail_identity"))?,
            hail_credentials_secret_name: optional_str(
                "hail_credentials_secret_name",
                field("hail_credentials_secret_name"),
            )?,
        })
    }

    /// Returns true when either identity reference was supplied.
    #[must_use]
    pub fn has_identity_refs(&self) -> bool {
        self.hail_identity.as_deref().is_some_and(|s| !s.is_empty())
            || self
                .hail_credentials_secret_name
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    /// Applies the account rules in their fixed order.
    ///
    /// # Errors
    ///
    /// `MultipleUserTypes`, then `EmptyLoginId`, then `InvalidUsername`, then
    /// `InvalidCredentialsSecretName`; the first violated rule wins.
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.is_developer && self.is_service_account {
            return Err(AccountError::MultipleUserTypes {
                username: self.username.clone(),
            });
        }
        if !self.is_service_account && self.login_id.as_deref().is_none_or(str::is_empty) {
            return Err(AccountError::EmptyLoginId {
                username: self.username.clone(),
            });
        }
        if !is_valid_username(&self.username) {
            return Err(AccountError::InvalidUsername {
                username: self.username.clone(),
            });
        }
        match &self.hail_credentials_secret_name {
            Some(name) if !is_valid_secret_name(name) => {
                Err(AccountError::InvalidCredentialsSecretName { name: name.clone() })
            }
            _ => Ok(()),
        }
    }
}

fn optional_str(field: &str, value: &Value) -> Result<Option<String>, AccountError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(invalid_type(field, other, "str")),
    }
}

fn required_bool(field: &str, value: &Value) -> Result<bool, AccountError> {
    value
        .as_bool()
        .ok_or_else(|| invalid_type(field, value, "bool"))
}

fn invalid_type(field: &str, value: &Value, expected: &'static str) -> AccountError {
    AccountError::InvalidType {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    }
}

/// Username policy: a lowercase letter followed by 1-14 lowercase letters or
/// digits.
#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && username.len() >= 2
        && username.len() <= USERNAME_MAX_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Kubernetes secret names must be RFC 1123 DNS subdomains.
#[must_use]
pub fn is_valid_secret_name(name: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !name.is_empty()
        && name.len() <= SECRET_NAME_MAX_LEN
        && name.starts_with(alnum)
        && name.ends_with(alnum)
        && name.chars().all(|c| alnum(c) || c == '-' || c == '.')
}

/// Derives a signup username from the local part of an email address.
#[must_use]
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn developer(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            login_id: Some("sub-123".to_string()),
            is_developer: true,
            is_service_account: false,
            hail_identity: None,
            hail_credentials_secret_name: None,
        }
    }

    #[test]
    fn state_round_trips_through_persisted_form() {
        for state in [
            AccountState::Creating,
            AccountState::Active,
            AccountState::Deleting,
            AccountState::Deleted,
        ] {
            assert_eq!(state.as_str().parse::<AccountState>(), Ok(state));
        }
        assert!("purged".parse::<AccountState>().is_err());
    }

    #[test]
    fn deleted_states() {
        assert!(AccountState::Deleting.is_deleted());
        assert!(AccountState::Deleted.is_deleted());
        assert!(!AccountState::Creating.is_deleted());
        assert!(!AccountState::Active.is_deleted());
    }

    #[test]
    fn username_policy() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("a1"));
        assert!(is_valid_username("abcdefghijklmno"));
        assert!(!is_valid_username("abcdefghijklmnop"));
        assert!(!is_valid_username("a"));
        assert!(!is_valid_username("1alice"));
        assert!(!is_valid_username("Alice"));
        assert!(!is_valid_username("al-ice"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn secret_name_policy() {
        assert!(is_valid_secret_name("alice-gsa-key"));
        assert!(is_valid_secret_name("a.b-c"));
        assert!(!is_valid_secret_name("-leading"));
        assert!(!is_valid_secret_name("trailing."));
        assert!(!is_valid_secret_name("Upper"));
        assert!(!is_valid_secret_name(""));
        assert!(!is_valid_secret_name(&"a".repeat(254)));
    }

    #[test]
    fn signup_username_keeps_alphanumerics_only() {
        assert_eq!(username_from_email("alice@example.org"), "alice");
        assert_eq!(username_from_email("Bob.Smith+x@example.org"), "bobsmithx");
    }

    #[test]
    fn from_json_reads_all_fields() {
        let body = json!({
            "login_id": "sub-1",
            "is_developer": false,
            "is_service_account": false,
            "hail_identity": "alice@project.iam",
        });
        let user = NewUser::from_json("alice", &body).expect("valid body");
        assert_eq!(user.login_id.as_deref(), Some("sub-1"));
        assert_eq!(user.hail_identity.as_deref(), Some("alice@project.iam"));
        assert!(user.hail_credentials_secret_name.is_none());
        assert!(user.has_identity_refs());
    }

    #[test]
    fn from_json_rejects_wrong_types() {
        let body = json!({"login_id": 7, "is_developer": false, "is_service_account": false});
        let err = NewUser::from_json("alice", &body).unwrap_err();
        assert!(matches!(err, AccountError::InvalidType { ref field, .. } if field == "login_id"));

        let body = json!({"login_id": "x", "is_developer": "yes", "is_service_account": false});
        let err = NewUser::from_json("alice", &body).unwrap_err();
        assert!(
            matches!(err, AccountError::InvalidType { ref field, expected: "bool", .. } if field == "is_developer")
        );
    }

    #[test]
    fn from_json_treats_missing_bool_as_invalid() {
        let body = json!({"login_id": "x", "is_developer": false});
        let err = NewUser::from_json("alice", &body).unwrap_err();
        assert!(
            matches!(err, AccountError::InvalidType { ref field, ref value, .. } if field == "is_service_account" && value == "null")
        );
    }

    #[test]
    fn both_roles_rejected_before_login_id_check() {
        let mut user = developer("Invalid!");
        user.is_service_account = true;
        user.login_id = None;
        assert!(matches!(
            user.validate(),
            Err(AccountError::MultipleUserTypes { .. })
        ));
    }

    #[test]
    fn human_needs_login_id_before_username_check() {
        let mut user = developer("Invalid!");
        user.login_id = Some(String::new());
        assert!(matches!(
            user.validate(),
            Err(AccountError::EmptyLoginId { .. })
        ));
    }

    #[test]
    fn service_account_without_login_id_is_valid() {
        let mut user = developer("ci");
        user.is_developer = false;
        user.is_service_account = true;
        user.login_id = None;
        assert_eq!(user.validate(), Ok(()));
    }

    #[test]
    fn bad_username_rejected() {
        assert!(matches!(
            developer("Invalid!").validate(),
            Err(AccountError::InvalidUsername { .. })
        ));
    }

    #[test]
    fn bad_secret_name_rejected_last() {
        let mut user = developer("alice");
        user.hail_credentials_secret_name = Some("Not_Valid".to_string());
        assert!(matches!(
            user.validate(),
            Err(AccountError::InvalidCredentialsSecretName { .. })
        ));
    }

    #[test]
    fn signup_is_plain_human() {
        let user = NewUser::signup("alice".to_string(), "abc123".to_string());
        assert!(!user.is_developer);
        assert!(!user.is_service_account);
        assert!(!user.has_identity_refs());
        assert_eq!(user.validate(), Ok(()));
    }
}
