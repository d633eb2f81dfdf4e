//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`SESSION__DEFAULT_MAX_AGE_SECS=3600`).
//!
//! See [`OidcConfig`](gatekeep_platform_access::OidcConfig) for identity
//! provider configuration.

use gatekeep_platform_access::{OidcConfig, ReusePolicy};
use serde::Deserialize;
use std::time::Duration;

/// Namespace whose deployment trusts the internal authorization header.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Deployment namespace. Anything other than `default` is a test
    /// deployment.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Public base URL of the gateway, without a trailing slash.
    pub external_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Hosts a `next` redirect may point at. The host of `external_url` is
    /// always allowed.
    #[serde(default)]
    pub allowed_redirect_hosts: Vec<String>,

    #[serde(default)]
    pub session: SessionConfig,

    pub oidc: OidcConfig,

    #[serde(default)]
    pub accounts: AccountPolicyConfig,

    #[serde(default)]
    pub waiter: WaiterConfig,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of browser sessions, in seconds.
    #[serde(default = "default_max_age_secs")]
    pub default_max_age_secs: i64,

    /// Lifetime of copy-paste tokens, in seconds.
    #[serde(default = "default_copy_paste_max_age_secs")]
    pub copy_paste_max_age_secs: i64,

    /// Interval between cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Base64 key, at least 64 bytes decoded, for the encrypted context
    /// cookie. A random key is generated when unset, which logs every
    /// browser out on restart.
    #[serde(default)]
    pub cookie_secret: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_age_secs() -> i64 {
    30 * 24 * 60 * 60
}

fn default_copy_paste_max_age_secs() -> i64 {
    300
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_age_secs: default_max_age_secs(),
            copy_paste_max_age_secs: default_copy_paste_max_age_secs(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
            cookie_secret: None,
        }
    }
}

/// Account lifecycle policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPolicyConfig {
    /// Allow usernames and login ids of fully deleted accounts to be taken
    /// again.
    #[serde(default)]
    pub reuse_purged_identities: bool,

    /// Non-developer accounts allowed to list users.
    #[serde(default = "default_user_listers")]
    pub user_listers: Vec<String>,
}

fn default_user_listers() -> Vec<String> {
    vec!["ci".to_string()]
}

impl Default for AccountPolicyConfig {
    fn default() -> Self {
        Self {
            reuse_purged_identities: false,
            user_listers: default_user_listers(),
        }
    }
}

impl AccountPolicyConfig {
    #[must_use]
    pub fn reuse_policy(&self) -> ReusePolicy {
        ReusePolicy {
            reuse_purged_identities: self.reuse_purged_identities,
        }
    }
}

/// Account-creation long-poll settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WaiterConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_polls() -> u32 {
    10
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

impl WaiterConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("allowed_redirect_hosts")
                    .with_list_parse_key("accounts.user_listers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns true outside the trusted namespace.
    #[must_use]
    pub fn is_test_deployment(&self) -> bool {
        self.namespace != DEFAULT_NAMESPACE
    }

    /// Returns true if the internal authorization header may be honored.
    #[must_use]
    pub fn trusts_internal_header(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
    }

    /// Joins `path` onto the external URL.
    #[must_use]
    pub fn external_url(&self, path: &str) -> String {
        format!("{}{}", self.external_url.trim_end_matches('/'), path)
    }
}
