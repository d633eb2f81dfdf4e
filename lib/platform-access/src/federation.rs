//! Identity federation with an external OAuth2 provider.
//!
//! A flow starts with [`IdentityProvider::initiate_flow`], which returns the
//! provider URL to send the user to together with the [`FlowState`] the
//! caller must keep until the provider redirects back. The callback is then
//! completed with [`IdentityProvider::receive_callback`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;

/// Which family of provider sits behind the trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
}

/// Data that threads an authorization-code exchange from initiation to
/// callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// Anti-forgery value echoed back by the provider.
    pub state: String,
    /// Value the ID token must carry.
    pub nonce: String,
    pub pkce_verifier: String,
    /// Redirect URI the flow was started with; the token exchange must repeat it.
    pub callback_uri: String,
}

/// A started flow.
#[derive(Debug, Clone)]
pub struct FlowInitiation {
    pub authorization_url: String,
    pub flow: FlowState,
}

/// Query parameters the provider appends to the redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Identity established by a completed flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Stable subject identifier at the provider.
    pub login_id: String,
    /// Email claim as reported; not proof of mailbox ownership.
    pub unverified_email: Option<String>,
    /// Tenant or hosted domain the identity belongs to.
    pub organization_id: Option<String>,
}

/// An OAuth2/OIDC identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// The tenant (Azure) or hosted domain (Google) accounts must belong to.
    fn organization_id(&self) -> &str;

    /// Builds the authorization URL for a new flow redirecting to `callback_uri`.
    fn initiate_flow(
        &self,
        callback_uri: &str,
    ) -> gatekeep_core::Result<FlowInitiation, AuthenticationError>;

    /// Exchanges the authorization code and verifies the resulting ID token.
    async fn receive_callback(
        &self,
        params: &CallbackParams,
        flow: &FlowState,
    ) -> gatekeep_core::Result<VerifiedIdentity, AuthenticationError>;

    /// Verifies a provider access token out of band and returns the unique
    /// id of its principal, or `None` if the provider does not accept it.
    async fn get_identity_uid_from_access_token(
        &self,
        access_token: &str,
    ) -> gatekeep_core::Result<Option<String>, AuthenticationError>;
}

/// Checks the callback against the flow it claims to complete and returns
/// the authorization code.
///
/// # Errors
///
/// `ProviderError` if the provider reported an error, `StateMismatch` if the
/// echoed state differs, `MissingClaim` if no code was returned.
pub fn authorization_code<'a>(
    provider: ProviderKind,
    params: &'a CallbackParams,
    flow: &FlowState,
) -> Result<&'a str, AuthenticationError> {
    if let Some(error) = &params.error {
        return Err(AuthenticationError::ProviderError {
            provider: format!("{provider:?}"),
            reason: match &params.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            },
        });
    }
    if params.state.as_deref() != Some(flow.state.as_str()) {
        return Err(AuthenticationError::StateMismatch);
    }
    params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthenticationError::MissingClaim {
            claim: "code".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> FlowState {
        FlowState {
            state: "st4te".to_string(),
            nonce: "n".to_string(),
            pkce_verifier: "v".to_string(),
            callback_uri: "https://auth.example.org/oauth2callback".to_string(),
        }
    }

    fn params(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            ..CallbackParams::default()
        }
    }

    #[test]
    fn matching_state_yields_code() {
        let p = params(Some("c0de"), Some("st4te"));
        assert_eq!(
            authorization_code(ProviderKind::Google, &p, &flow()),
            Ok("c0de")
        );
    }

    #[test]
    fn state_mismatch_rejected() {
        let p = params(Some("c0de"), Some("forged"));
        assert_eq!(
            authorization_code(ProviderKind::Google, &p, &flow()),
            Err(AuthenticationError::StateMismatch)
        );
        let p = params(Some("c0de"), None);
        assert_eq!(
            authorization_code(ProviderKind::Google, &p, &flow()),
            Err(AuthenticationError::StateMismatch)
        );
    }

    #[test]
    fn provider_error_wins() {
        let p = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("user cancelled".to_string()),
            ..params(None, Some("st4te"))
        };
        let err = authorization_code(ProviderKind::Microsoft, &p, &flow()).unwrap_err();
        assert!(err.to_string().contains("access_denied: user cancelled"));
    }

    #[test]
    fn missing_code_rejected() {
        let p = params(Some(""), Some("st4te"));
        assert!(matches!(
            authorization_code(ProviderKind::Google, &p, &flow()),
            Err(AuthenticationError::MissingClaim { .. })
        ));
    }

    #[test]
    fn flow_state_survives_json() {
        let json = serde_json::to_string(&flow()).expect("serialize");
        let parsed: FlowState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, flow());
    }

    #[test]
    fn provider_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(ProviderKind::Microsoft).expect("serialize"),
            "microsoft"
        );
    }
}
