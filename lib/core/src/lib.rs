//! Core identifiers and error plumbing shared by the gatekeep crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, RoleId, UserId};
