//! Matchmaking directory integration
//!
//! The public matchmaking directory is a third-party, title-scoped HTTP API.
//! Its request validation is strict about presentation: headers, SDK tag and
//! user agent must match the game client build it knows, byte for byte, or
//! requests are rejected. The constants below are therefore part of the wire
//! contract and must not be "modernized".
//!
//! Submodules:
//! - `client`: the authenticated HTTP client and its push operations
//! - `records`: wire payloads and their in-memory form
//! - `reconcile`: grace table and health clock fed by query results

pub mod client;
pub mod records;
pub mod reconcile;

pub use client::DirectoryClient;
pub use records::{DirectoryServer, DirectoryServerTags};
pub use reconcile::{GraceTable, HealthClock};

/// SDK tag the directory expects in the query string and headers.
pub const SDK_VERSION: &str = "UE4MKPL-1.49.201027";

/// User agent of the game client build the directory recognizes.
pub const CLIENT_USER_AGENT: &str =
    "Astro/++UE4+Release-4.23-CL-0 Windows/10.0.19041.1.768.64bit";

/// Prefix folded into the derived account identity so supervisor accounts
/// are recognizable in the directory's player tooling.
pub const ACCOUNT_PREFIX: &str = "fleetward_";

/// Directory client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Query timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Directory returned HTTP {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
