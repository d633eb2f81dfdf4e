//! gatekeep authentication gateway.
//!
//! Federates login with an OIDC provider, issues sessions and copy-paste
//! tokens, manages the account lifecycle, and answers credential checks
//! for other services.

pub mod auth;
pub mod config;
pub mod error;
pub mod router;
