//! Reconciliation loop and sustained-outage escalation
//!
//! The supervisor drives everything on a fixed cadence:
//! 1. make sure the directory session is fresh
//! 2. refresh the game-list snapshot under its deadline
//! 3. run a status pass over every server in the fleet
//! 4. if the query failed, check how long the directory has been silent
//!
//! Auth and query failures are logged and the cycle carries on; the status
//! pass runs unconditionally so operators keep seeing process state through
//! an outage. Only silence longer than the outage tolerance ends the loop,
//! and that surfaces as a typed error so `main` owns process teardown and
//! exit codes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;
use crate::directory::{DirectoryClient, DirectoryError};
use crate::fleet::Fleet;

/// The directory stayed unreachable past the configured tolerance.
#[derive(Debug, Clone, thiserror::Error)]
#[error("directory unreachable for {unreachable_secs}s (tolerance {tolerance_secs}s)")]
pub struct FatalOutage {
    pub unreachable_secs: u64,
    pub tolerance_secs: u64,
}

pub struct Supervisor {
    client: Arc<DirectoryClient>,
    fleet: Arc<Fleet>,
    interval: Duration,
    outage_tolerance: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for asking a running supervisor to wind down.
#[derive(Clone)]
pub struct SupervisorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SupervisorHandle {
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Supervisor {
    pub fn new(
        client: Arc<DirectoryClient>,
        fleet: Arc<Fleet>,
        config: &DirectoryConfig,
    ) -> (Self, SupervisorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            Self {
                client,
                fleet,
                interval: Duration::from_millis(config.status_interval_ms),
                outage_tolerance: Duration::from_secs(config.outage_tolerance_secs),
                shutdown_rx,
            },
            SupervisorHandle { shutdown_tx },
        )
    }

    /// Run until asked to stop or the outage tolerance is blown. Returns at
    /// most one `FatalOutage`; the loop ends with it.
    pub async fn run(mut self) -> Result<(), FatalOutage> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Reconciliation loop starting"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await?;
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Reconciliation loop stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn cycle(&self) -> Result<(), FatalOutage> {
        if let Err(error) = self.client.ensure_authenticated().await {
            warn!(%error, "Directory authentication failed");
        }

        let refresh = self.client.refresh().await;
        match &refresh {
            Ok(visible) => debug!(visible = *visible, "Cycle query complete"),
            Err(DirectoryError::Timeout) => warn!("Directory query exceeded its deadline"),
            Err(error) => warn!(%error, "Directory query failed"),
        }

        // Status pass runs whether or not the query landed.
        self.fleet.update_all().await;

        if refresh.is_err() {
            let health = self.client.health().await;
            if health.outage_exceeds(self.outage_tolerance) {
                return Err(FatalOutage {
                    unreachable_secs: health.last_successful_query.elapsed().as_secs(),
                    tolerance_secs: self.outage_tolerance.as_secs(),
                });
            }
        }
        Ok(())
    }
}
