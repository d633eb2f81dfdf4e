//! Shared `Result` alias built on rootcause.
//!
//! Domain crates define their own error enums; a `Report<C>` carries one of
//! those as its context while the error travels up through the gateway.

use rootcause::Report;

/// Result whose error side is a rootcause report with context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
