//! One supervised game server
//!
//! A server is either `local` (a child process this supervisor launches and
//! owns) or `remote` (running elsewhere, we only watch its public listing).
//! Either way it carries a directory identity of `address:port`; for local
//! servers the address part is the fleet's public address.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::directory::DirectoryClient;

use super::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    #[default]
    Local,
    Remote,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Local => "local",
            ServerKind::Remote => "remote",
        }
    }
}

/// Mutable per-cycle view of one server.
#[derive(Debug, Default)]
struct ServerState {
    listed: bool,
    players: u32,
    max_players: u32,
    updates: u64,
    process_running: bool,
}

/// Status snapshot served by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub kind: ServerKind,
    pub identity: String,
    pub listed: bool,
    pub players: u32,
    pub max_players: u32,
    pub updates: u64,
    pub process_running: bool,
}

pub struct GameServer {
    name: String,
    kind: ServerKind,
    identity: String,
    command: Option<String>,
    args: Vec<String>,
    data_dir: PathBuf,
    quiet_marker: PathBuf,
    webhook_url: RwLock<Option<String>>,
    state: RwLock<ServerState>,
    child: Mutex<Option<Child>>,
    client: Arc<DirectoryClient>,
}

impl GameServer {
    pub fn from_config(
        config: &ServerConfig,
        public_address: &str,
        data_root: &Path,
        client: Arc<DirectoryClient>,
    ) -> Self {
        let identity = match &config.address {
            Some(address) => address.clone(),
            None => format!("{}:{}", public_address, config.port),
        };
        Self {
            name: config.name.clone(),
            kind: config.kind,
            identity,
            command: config.command.clone(),
            args: config.args.clone(),
            data_dir: data_root.join("servers").join(&config.name),
            quiet_marker: data_root.join("silent"),
            webhook_url: RwLock::new(config.webhook_url.clone()),
            state: RwLock::new(ServerState::default()),
            child: Mutex::new(None),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Prepare the working directory and register the directory identity.
    pub async fn init(&self) -> Result<(), FleetError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| FleetError::DataDir(format!("{}: {}", self.data_dir.display(), e)))?;
        self.client.register_identity(&self.identity).await;
        info!(
            server = %self.name,
            kind = self.kind.as_str(),
            identity = %self.identity,
            "Server initialized"
        );
        Ok(())
    }

    /// Launch the child process of a local server. Remote servers have
    /// nothing to launch.
    pub async fn start(&self) -> Result<(), FleetError> {
        if self.kind != ServerKind::Local {
            debug!(server = %self.name, "Remote server, nothing to launch");
            return Ok(());
        }
        let command = self.command.as_deref().ok_or_else(|| {
            FleetError::Launch(self.name.clone(), "no launch command configured".to_string())
        })?;

        let child = Command::new(command)
            .args(&self.args)
            .current_dir(&self.data_dir)
            .spawn()
            .map_err(|e| FleetError::Launch(self.name.clone(), e.to_string()))?;

        info!(server = %self.name, pid = child.id(), "Server process launched");
        self.state.write().await.process_running = true;
        *self.child.lock().await = Some(child);
        Ok(())
    }

    /// Stop a local server: notify, take it out of the public listing, then
    /// kill the child if it is still running. The deregistration pushes run
    /// in the background; the grace table already hides the listing.
    pub async fn stop(&self) {
        if self.kind != ServerKind::Local {
            return;
        }
        self.notify(format!("{} is shutting down", self.name)).await;
        self.client.deregister(&self.identity).await;

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match child.kill().await {
                Ok(()) => info!(server = %self.name, "Server process stopped"),
                Err(error) => warn!(server = %self.name, %error, "Failed to kill server process"),
            }
        }
        self.state.write().await.process_running = false;
    }

    /// One status pass: poll the child, read our listing from the snapshot,
    /// log and notify on transitions, and heartbeat a locally owned listing.
    pub async fn update(&self) {
        let process_running = self.check_process().await;
        let listing = self.client.get(&self.identity).await;

        let (went_listed, went_unlisted) = {
            let mut state = self.state.write().await;
            state.updates += 1;
            state.process_running = process_running;

            match &listing {
                Some(listing) => {
                    let fresh = !state.listed;
                    state.listed = true;
                    state.players = listing.player_user_ids.len() as u32;
                    state.max_players = listing.tags.max_players;
                    (fresh, false)
                }
                None => {
                    let dropped = state.listed;
                    state.listed = false;
                    state.players = 0;
                    (false, dropped)
                }
            }
        };

        if went_listed {
            info!(server = %self.name, identity = %self.identity, "Server is publicly listed");
            self.notify(format!("{} is now publicly listed", self.name)).await;
        }
        if went_unlisted {
            warn!(server = %self.name, identity = %self.identity, "Server dropped out of the public listing");
            self.notify(format!("{} dropped out of the public listing", self.name))
                .await;
        }

        if let Some(listing) = listing {
            if self.kind == ServerKind::Local {
                self.client.spawn_heartbeat(listing);
            }
        }
    }

    /// Poll a local child for liveness without blocking the cycle.
    async fn check_process(&self) -> bool {
        if self.kind != ServerKind::Local {
            return false;
        }
        let mut guard = self.child.lock().await;
        let mut child = match guard.take() {
            Some(child) => child,
            None => return false,
        };
        match child.try_wait() {
            Ok(None) => {
                *guard = Some(child);
                true
            }
            Ok(Some(status)) => {
                drop(guard);
                warn!(server = %self.name, %status, "Server process exited");
                self.notify(format!("{} process exited ({status})", self.name))
                    .await;
                false
            }
            Err(error) => {
                *guard = Some(child);
                warn!(server = %self.name, %error, "Could not poll server process");
                true
            }
        }
    }

    /// Post a short status message to the notification endpoint, if one is
    /// set. Best effort on a spawned task; a cycle never waits on it.
    /// The silent marker left behind by a silent shutdown mutes everything
    /// until the next startup clears it.
    async fn notify(&self, message: String) {
        if self.quiet_marker.exists() {
            debug!(server = %self.name, "Notification muted by silent marker");
            return;
        }
        if let Some(url) = self.webhook_url.read().await.clone() {
            let server = self.name.clone();
            tokio::spawn(async move {
                let client = reqwest::Client::new();
                let result = client
                    .post(&url)
                    .json(&serde_json::json!({ "content": message }))
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await;
                match result {
                    Ok(response) if !response.status().is_success() => {
                        warn!(server = %server, status = %response.status(), "Notification endpoint rejected the message");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(server = %server, %error, "Failed to reach notification endpoint");
                    }
                }
            });
        }
    }

    /// Drop the notification endpoint so no further messages are sent.
    pub async fn blank_webhook(&self) {
        *self.webhook_url.write().await = None;
    }

    pub async fn status(&self) -> ServerStatus {
        let state = self.state.read().await;
        ServerStatus {
            name: self.name.clone(),
            kind: self.kind,
            identity: self.identity.clone(),
            listed: state.listed,
            players: state.players,
            max_players: state.max_players,
            updates: state.updates,
            process_running: state.process_running,
        }
    }
}
