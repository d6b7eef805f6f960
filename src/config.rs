//! Supervisor configuration
//!
//! Loaded from a TOML file at startup. Every tunable has a default so a
//! minimal config only needs the `[[servers]]` entries; a missing file makes
//! the binary write a starter template and exit so the operator can fill it
//! in.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fleet::ServerKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operator name shown on the dashboard
    #[serde(default)]
    pub owner: String,

    /// Public IPv4 address local servers are reachable on.
    /// Discovered at startup when unset.
    #[serde(default)]
    pub public_address: Option<String>,

    /// Directory for per-server working state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How long a shutdown may spend stopping local servers
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Matchmaking directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Title the fleet registers under
    #[serde(default = "default_title_id")]
    pub title_id: String,

    /// Endpoint override, mainly for tests. Derived from the title when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Milliseconds between reconciliation cycles
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,

    /// Hard bound on a single game-list query, in milliseconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,

    /// Session ticket lifetime before a fresh login is attempted
    #[serde(default = "default_auth_ttl")]
    pub auth_ttl_secs: u64,

    /// How long the directory may stay unreachable before the process gives up
    #[serde(default = "default_outage_tolerance")]
    pub outage_tolerance_secs: u64,

    /// Reconciliation cycles a deregistered server stays suppressed
    #[serde(default = "default_grace_cycles")]
    pub grace_cycles: u32,
}

impl DirectoryConfig {
    /// Base URL all directory requests are sent to.
    pub fn endpoint(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.playfabapi.com", self.title_id),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            title_id: default_title_id(),
            base_url: None,
            status_interval_ms: default_status_interval(),
            query_timeout_ms: default_query_timeout(),
            auth_ttl_secs: default_auth_ttl(),
            outage_tolerance_secs: default_outage_tolerance(),
            grace_cycles: default_grace_cycles(),
        }
    }
}

/// Status dashboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Whether the dashboard is served at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP port the dashboard binds on
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http_port: default_http_port(),
        }
    }
}

/// One supervised game server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique name, also used as the working-state subdirectory
    pub name: String,

    /// Whether the server runs as a local child process or is only watched
    #[serde(default)]
    pub kind: ServerKind,

    /// Game port a local server listens on
    #[serde(default)]
    pub port: u16,

    /// Full `host:port` endpoint of a remote server
    #[serde(default)]
    pub address: Option<String>,

    /// Command that launches a local server process
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed to the launch command
    #[serde(default)]
    pub args: Vec<String>,

    /// Notification endpoint for status-change messages
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// Defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from("fleetward-data")
}
fn default_shutdown_grace() -> u64 {
    20
}
fn default_title_id() -> String {
    "5EA1".to_string()
}
fn default_status_interval() -> u64 {
    4000
}
fn default_query_timeout() -> u64 {
    1000
}
fn default_auth_ttl() -> u64 {
    3600
}
fn default_outage_tolerance() -> u64 {
    3600
}
fn default_grace_cycles() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_http_port() -> u16 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: String::new(),
            public_address: None,
            data_dir: default_data_dir(),
            shutdown_grace_secs: default_shutdown_grace(),
            directory: DirectoryConfig::default(),
            dashboard: DashboardConfig::default(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write a starter config with one example server for the operator to edit.
    pub fn write_template(path: &Path) -> Result<(), ConfigError> {
        let mut sample = Config::default();
        sample.owner = "unnamed".to_string();
        sample.servers.push(ServerConfig {
            name: "server-1".to_string(),
            kind: ServerKind::Local,
            port: 8777,
            address: None,
            command: Some("./start-server.sh".to_string()),
            args: Vec::new(),
            webhook_url: None,
        });
        let body = toml::to_string_pretty(&sample).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let content = format!(
            "# Fleetward configuration\n# Edit this file, then start fleetward again.\n\n{body}"
        );
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject configurations the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.title_id.is_empty() {
            return Err(ConfigError::Invalid("directory.title_id is empty".into()));
        }
        if self.directory.status_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "directory.status_interval_ms must be greater than zero".into(),
            ));
        }
        if self.directory.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "directory.query_timeout_ms must be greater than zero".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err(ConfigError::Invalid("server with an empty name".into()));
            }
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
            match server.kind {
                ServerKind::Local => {
                    if server.port == 0 {
                        return Err(ConfigError::Invalid(format!(
                            "local server '{}' needs a port",
                            server.name
                        )));
                    }
                    if server.command.is_none() {
                        return Err(ConfigError::Invalid(format!(
                            "local server '{}' needs a launch command",
                            server.name
                        )));
                    }
                }
                ServerKind::Remote => match &server.address {
                    Some(address) if address.contains(':') => {}
                    Some(_) => {
                        return Err(ConfigError::Invalid(format!(
                            "remote server '{}' address must be 'host:port'",
                            server.name
                        )));
                    }
                    None => {
                        return Err(ConfigError::Invalid(format!(
                            "remote server '{}' needs an address",
                            server.name
                        )));
                    }
                },
            }
        }
        Ok(())
    }
}
