//! Accounts, sessions, and identity federation for the gatekeep gateway.
//!
//! This crate holds the storage-independent half of the gateway:
//! - Account records, their lifecycle states, and creation rules (`User`, `NewUser`)
//! - Conflict resolution for concurrent account creation (`resolve_conflicts`)
//! - Sessions, copy-paste tokens, and secret generation
//! - The `IdentityProvider` trait implemented per cloud by the server
//! - Access requirements checked against a resolved caller
//!
//! # Example
//!
//! ```
//! use gatekeep_platform_access::{NewUser, ReusePolicy, Resolution, resolve_conflicts};
//!
//! let signup = NewUser::signup("alice".to_string(), "abc123".to_string());
//! signup.validate().expect("valid signup");
//!
//! let outcome = resolve_conflicts(&signup, &[], ReusePolicy::default());
//! assert_eq!(outcome, Ok(Resolution::Insert));
//! ```

pub mod account;
pub mod auth;
pub mod context;
pub mod error;
pub mod federation;
pub mod oidc;
pub mod role;
pub mod session;
pub mod token;
pub mod user;

pub use account::{Resolution, ReusePolicy, resolve_conflicts};
pub use auth::{AuthenticatedUser, CredentialSource};
pub use context::{FlashMessage, FlowCaller, MessageKind, SessionContext};
pub use error::{AccountError, AccountErrorKind, AuthenticationError, AuthorizationError};
pub use federation::{
    CallbackParams, FlowInitiation, FlowState, IdentityProvider, ProviderKind, VerifiedIdentity,
};
pub use oidc::{CliClientConfig, Cloud, OidcConfig};
pub use role::{Requirement, Role};
pub use session::{CopyPasteToken, SESSION_ID_LEN, SessionId};
pub use user::{AccountState, NewUser, User};
