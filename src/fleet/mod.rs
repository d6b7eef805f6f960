//! The supervised server fleet
//!
//! A fleet is built once from config at startup. Lifecycle:
//! 1. `init_all` prepares working directories and registers every server's
//!    directory identity, in config order
//! 2. `start_all` launches the local child processes
//! 3. `update_all` runs once per reconciliation cycle, whether or not the
//!    directory answered
//! 4. `stop_all` deregisters and kills local processes at shutdown

pub mod server;

pub use server::{GameServer, ServerKind, ServerStatus};

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::config::Config;
use crate::directory::DirectoryClient;

/// Fleet errors
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Failed to prepare working directory: {0}")]
    DataDir(String),

    #[error("Failed to launch '{0}': {1}")]
    Launch(String, String),
}

pub struct Fleet {
    servers: Vec<Arc<GameServer>>,
}

impl Fleet {
    pub fn from_config(config: &Config, public_address: &str, client: Arc<DirectoryClient>) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|server| {
                Arc::new(GameServer::from_config(
                    server,
                    public_address,
                    &config.data_dir,
                    Arc::clone(&client),
                ))
            })
            .collect();
        Self { servers }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Prepare working directories and register identities, in config order.
    /// Registration order feeds the derived account identity, so it has to
    /// be deterministic.
    pub async fn init_all(&self) -> Result<(), FleetError> {
        for server in &self.servers {
            server.init().await?;
        }
        Ok(())
    }

    /// Launch every local server process. A launch failure is fatal: a fleet
    /// that cannot start as configured should be fixed, not half-run.
    pub async fn start_all(&self) -> Result<(), FleetError> {
        for server in &self.servers {
            if let Err(e) = server.start().await {
                error!(server = %server.name(), error = %e, "Server failed to launch");
                return Err(e);
            }
        }
        Ok(())
    }

    /// One status pass over every server.
    pub async fn update_all(&self) {
        for server in &self.servers {
            server.update().await;
        }
    }

    /// Stop local servers: deregister from the directory, then kill.
    pub async fn stop_all(&self) {
        for server in &self.servers {
            server.stop().await;
        }
    }

    /// Drop every notification endpoint so a silent shutdown stays silent.
    pub async fn blank_webhooks(&self) {
        for server in &self.servers {
            server.blank_webhook().await;
        }
    }

    pub async fn statuses(&self) -> Vec<ServerStatus> {
        let mut statuses = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            statuses.push(server.status().await);
        }
        statuses
    }
}
