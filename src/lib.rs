//! Fleetward - supervisor for dedicated game-server fleets
//!
//! Fleetward keeps a fleet of dedicated game servers publicly visible in a
//! third-party matchmaking directory. It owns the server processes it is
//! configured with, reconciles the directory's view of them on a fixed
//! cadence, and serves a small read-only dashboard for operators.
//!
//! ## Components
//!
//! - **Directory**: authenticated client for the matchmaking directory,
//!   including the grace table that absorbs stale listings after deregistration
//! - **Fleet**: the supervised servers themselves (local child processes or
//!   remote endpoints) and their per-cycle status updates
//! - **Supervisor**: the reconciliation loop tying the two together, with
//!   sustained-outage escalation
//! - **Dashboard**: read-only HTTP status surface

pub mod config;
pub mod dashboard;
pub mod deadline;
pub mod directory;
pub mod fleet;
pub mod supervisor;

pub use config::Config;
pub use directory::{DirectoryClient, DirectoryError};
pub use supervisor::{FatalOutage, Supervisor, SupervisorHandle};
