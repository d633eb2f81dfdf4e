//! Identity provider configuration.
//!
//! One deployment talks to exactly one provider family, selected by
//! `cloud`: Google accounts on `gcp`, Microsoft Entra ID on `azure`.

use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;

const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// Cloud the deployment runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Gcp,
    Azure,
}

/// Configuration for the OAuth2 identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    cloud: Cloud,
    /// Client the gateway's own browser flows use.
    client_id: String,
    client_secret: String,
    /// Azure tenant; required on `azure`.
    #[serde(default)]
    tenant_id: Option<String>,
    /// Hosted domain (Google) or tenant (Azure) that accounts must belong
    /// to. On Azure this defaults to `tenant_id`.
    #[serde(default)]
    organization_id: Option<String>,
    /// Public client handed to the command-line tool.
    #[serde(default)]
    cli_client_id: Option<String>,
    #[serde(default)]
    cli_client_secret: Option<String>,
    /// OAuth2 scopes as a comma-separated string.
    #[serde(default = "default_scopes")]
    scopes: String,
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

/// Client configuration served to the command-line tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliClientConfig {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl OidcConfig {
    #[must_use]
    pub fn cloud(&self) -> Cloud {
        self.cloud
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Returns the configured organization, falling back to the tenant on Azure.
    #[must_use]
    pub fn organization_id(&self) -> Option<&str> {
        match (self.cloud, self.organization_id.as_deref()) {
            (_, Some(org)) => Some(org),
            (Cloud::Azure, None) => self.tenant_id(),
            (Cloud::Gcp, None) => None,
        }
    }

    /// Returns the client ids whose tokens the gateway accepts.
    #[must_use]
    pub fn accepted_audiences(&self) -> Vec<&str> {
        std::iter::once(self.client_id.as_str())
            .chain(self.cli_client_id.as_deref())
            .collect()
    }

    /// Returns the OAuth2 scopes, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the issuer URL used for discovery.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on Azure without a tenant.
    pub fn issuer_url(&self) -> Result<String, AuthenticationError> {
        match self.cloud {
            Cloud::Gcp => Ok(GOOGLE_ISSUER.to_string()),
            Cloud::Azure => self
                .tenant_id()
                .map(|tenant| format!("https://login.microsoftonline.com/{tenant}/v2.0"))
                .ok_or_else(|| AuthenticationError::Configuration {
                    reason: "oidc.tenant_id is required on azure".to_string(),
                }),
        }
    }

    /// Returns the configuration served to the command-line tool.
    #[must_use]
    pub fn cli_client(&self) -> CliClientConfig {
        CliClientConfig {
            client_id: self
                .cli_client_id
                .clone()
                .unwrap_or_else(|| self.client_id.clone()),
            client_secret: self.cli_client_secret.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }

    /// Checks the settings that cannot be defaulted.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the issuer or the organization
    /// cannot be determined.
    pub fn validate(&self) -> Result<(), AuthenticationError> {
        self.issuer_url()?;
        if self.organization_id().is_none() {
            return Err(AuthenticationError::Configuration {
                reason: "oidc.organization_id is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn parse(value: Value) -> OidcConfig {
        serde_json::from_value(value).expect("deserialize")
    }

    #[test]
    fn deserializes_with_defaults() {
        let config = parse(json!({
            "cloud": "gcp",
            "client_id": "web-client",
            "client_secret": "secret",
            "organization_id": "example.org"
        }));

        assert_eq!(config.cloud(), Cloud::Gcp);
        assert_eq!(config.scopes(), vec!["openid", "email", "profile"]);
        assert_eq!(config.issuer_url().as_deref(), Ok(GOOGLE_ISSUER));
        assert_eq!(config.accepted_audiences(), vec!["web-client"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn azure_issuer_includes_tenant() {
        let config = parse(json!({
            "cloud": "azure",
            "client_id": "app",
            "client_secret": "s",
            "tenant_id": "tenant-1"
        }));
        assert_eq!(
            config.issuer_url().as_deref(),
            Ok("https://login.microsoftonline.com/tenant-1/v2.0")
        );
        assert_eq!(config.organization_id(), Some("tenant-1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn azure_without_tenant_is_rejected() {
        let config = parse(json!({"cloud": "azure", "client_id": "app", "client_secret": "s"}));
        assert!(matches!(
            config.validate(),
            Err(AuthenticationError::Configuration { .. })
        ));
    }

    #[test]
    fn gcp_requires_hosted_domain() {
        let config = parse(json!({"cloud": "gcp", "client_id": "app", "client_secret": "s"}));
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_client_defaults_to_server_client() {
        let config = parse(json!({"cloud": "gcp", "client_id": "app", "client_secret": "s"}));
        assert_eq!(config.cli_client().client_id, "app");

        let config = parse(json!({
            "cloud": "gcp",
            "client_id": "app",
            "client_secret": "s",
            "cli_client_id": "cli",
            "cli_client_secret": "cli-secret"
        }));
        assert_eq!(config.cli_client().client_id, "cli");
        assert_eq!(config.cli_client().client_secret.as_deref(), Some("cli-secret"));
        assert_eq!(config.accepted_audiences(), vec!["app", "cli"]);
    }

    #[test]
    fn scopes_trim_and_skip_empty() {
        let config = parse(json!({
            "cloud": "gcp",
            "client_id": "c",
            "client_secret": "s",
            "scopes": "openid, email,,profile "
        }));
        assert_eq!(config.scopes(), vec!["openid", "email", "profile"]);
    }
}
