//! Per-browser session context.
//!
//! The context lives in an encrypted cookie and threads a browser through
//! login, signup, and the account-creation wait. It is distinct from the
//! server-side session its [`SessionId`] points at.

use serde::{Deserialize, Serialize};

use crate::federation::FlowState;
use crate::session::SessionId;

/// Which browser entry point started the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowCaller {
    Login,
    Signup,
}

/// Severity of a [`FlashMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Error,
}

/// A one-shot notice shown on the next page the browser loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub text: String,
    pub kind: MessageKind,
}

/// Typed contents of the context cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Server-side session this browser is logged in with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Set while an account for `login_id` is being created.
    #[serde(default)]
    pub pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    /// Where to send the browser once logged in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<FlowCaller>,
    /// In-flight OAuth2 flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<FlashMessage>,
}

impl SessionContext {
    /// Starts a fresh context for a new login or signup flow.
    #[must_use]
    pub fn for_flow(caller: FlowCaller, next: String, flow: FlowState) -> Self {
        Self {
            next: Some(next),
            caller: Some(caller),
            flow: Some(flow),
            ..Self::default()
        }
    }

    /// Context for a browser waiting on account creation.
    #[must_use]
    pub fn pending(login_id: String, next: Option<String>) -> Self {
        Self {
            pending: true,
            login_id: Some(login_id),
            next,
            ..Self::default()
        }
    }

    /// Context for a logged-in browser.
    #[must_use]
    pub fn logged_in(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    /// Returns the login id being waited on, if the context is pending.
    #[must_use]
    pub fn pending_login_id(&self) -> Option<&str> {
        if self.pending {
            self.login_id.as_deref()
        } else {
            None
        }
    }

    /// Sets the notice for the next page.
    pub fn set_message(&mut self, text: impl Into<String>, kind: MessageKind) {
        self.message = Some(FlashMessage {
            text: text.into(),
            kind,
        });
    }

    /// Drops every key.
    pub fn cleanup(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> FlowState {
        FlowState {
            state: "s".to_string(),
            nonce: "n".to_string(),
            pkce_verifier: "v".to_string(),
            callback_uri: "https://auth.example.org/oauth2callback".to_string(),
        }
    }

    #[test]
    fn cleanup_clears_everything() {
        let mut ctx = SessionContext::for_flow(FlowCaller::Signup, "/next".to_string(), flow());
        ctx.session_id = Some(SessionId::new("x".to_string()));
        ctx.cleanup();
        assert!(ctx.is_empty());
    }

    #[test]
    fn pending_login_id_requires_pending_flag() {
        let ctx = SessionContext::pending("sub".to_string(), None);
        assert_eq!(ctx.pending_login_id(), Some("sub"));

        let ctx = SessionContext {
            login_id: Some("sub".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(ctx.pending_login_id(), None);
    }

    #[test]
    fn empty_context_serializes_compactly() {
        let json = serde_json::to_string(&SessionContext::default()).expect("serialize");
        assert_eq!(json, r#"{"pending":false}"#);
        let parsed: SessionContext = serde_json::from_str("{}").expect("deserialize");
        assert!(parsed.is_empty());
    }

    #[test]
    fn message_survives_until_taken() {
        let mut ctx = SessionContext::default();
        ctx.set_message("Account does not exist", MessageKind::Error);
        assert!(!ctx.is_empty());

        let message = ctx.message.take().expect("message");
        assert_eq!(message.kind, MessageKind::Error);
        assert!(ctx.is_empty());
    }

    #[test]
    fn flow_context_round_trips() {
        let ctx = SessionContext::for_flow(FlowCaller::Login, "/user".to_string(), flow());
        let json = serde_json::to_string(&ctx).expect("serialize");
        let parsed: SessionContext = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, ctx);
        assert_eq!(parsed.caller, Some(FlowCaller::Login));
    }
}
