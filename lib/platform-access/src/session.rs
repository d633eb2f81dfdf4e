//! Server-side sessions and copy-paste tokens.
//!
//! A session id is a bearer credential: whoever presents it acts as the
//! owning account for as long as the session is valid.

use serde::{Deserialize, Serialize};

/// Length of every session id the gateway issues.
pub const SESSION_ID_LEN: usize = 44;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `credential` has the shape of an issued session id.
    ///
    /// Anything else cannot be a session and is never looked up.
    #[must_use]
    pub fn has_session_shape(credential: &str) -> bool {
        credential.len() == SESSION_ID_LEN
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Short-lived single-use code exchanged for a session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CopyPasteToken(String);

impl CopyPasteToken {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CopyPasteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_shape_is_exact_length() {
        assert!(SessionId::has_session_shape(&"a".repeat(44)));
        assert!(!SessionId::has_session_shape(&"a".repeat(43)));
        assert!(!SessionId::has_session_shape(&"a".repeat(45)));
        assert!(!SessionId::has_session_shape(""));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = SessionId::new("x".repeat(SESSION_ID_LEN));
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", "x".repeat(SESSION_ID_LEN)));
    }
}
