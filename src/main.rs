//! fleetward: keep a fleet of dedicated game servers publicly listed
//!
//! The daemon owns its configured server processes and reconciles the
//! public matchmaking directory's view of them on a fixed cadence:
//! - refresh the directory session and game-list snapshot
//! - run a status pass over every server, heartbeating owned listings
//! - escalate with a non-zero exit after a sustained directory outage
//!
//! Ctrl-C stops local servers and deregisters them; a second Ctrl-C during
//! the grace window makes the shutdown silent.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use fleetward::config::Config;
use fleetward::dashboard::{create_router, DashboardState};
use fleetward::directory::DirectoryClient;
use fleetward::fleet::{Fleet, ServerKind};
use fleetward::supervisor::Supervisor;

/// Echo service asked for our public address when the config leaves it unset.
const PUBLIC_ADDRESS_SERVICE: &str = "https://api.ipify.org";

/// Seconds the silent marker keeps muting notifications after a restart.
const SILENT_MARKER_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "fleetward")]
#[command(about = "Supervisor that keeps a fleet of dedicated game servers publicly listed")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fleetward.toml")]
    config: PathBuf,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "FLEETWARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public address for local server identities (overrides config file)
    #[arg(long, env = "FLEETWARD_PUBLIC_ADDRESS")]
    public_address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetward=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting fleetward v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", cli.config.display());

    // First run: write a starter config and let the operator fill it in
    if !cli.config.exists() {
        Config::write_template(&cli.config).context("writing starter config")?;
        info!(
            "No config found; wrote a starter config to {}. Edit it and start again",
            cli.config.display()
        );
        return Ok(());
    }

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(public_address) = cli.public_address {
        config.public_address = Some(public_address);
    }

    if config.servers.is_empty() {
        warn!("No servers configured, nothing to supervise");
        return Ok(());
    }

    info!("Data dir: {}", config.data_dir.display());
    let public_address = resolve_public_address(&config).await?;

    let client = Arc::new(DirectoryClient::new(&config.directory)?);
    let fleet = Arc::new(Fleet::from_config(
        &config,
        &public_address,
        Arc::clone(&client),
    ));
    fleet.init_all().await.context("initializing fleet")?;

    // A silent marker left by the previous shutdown keeps muting
    // notifications for a minute, then clears itself.
    let quiet_marker = config.data_dir.join("silent");
    if quiet_marker.exists() {
        info!(
            "Previous shutdown was silent; notifications muted for {}s",
            SILENT_MARKER_SECS
        );
        let marker = quiet_marker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(SILENT_MARKER_SECS)).await;
            if let Err(error) = tokio::fs::remove_file(&marker).await {
                warn!(%error, "Could not clear the silent marker");
            }
        });
    }

    // Dashboard runs on its own task for the life of the process
    if config.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            config.clone(),
            public_address.clone(),
            Arc::clone(&fleet),
            Arc::clone(&client),
        ));
        let app = create_router(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.dashboard.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding dashboard on {addr}"))?;
        info!("Dashboard listening on http://{}", addr);
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                error!(%error, "Dashboard server stopped");
            }
        });
    }

    fleet.start_all().await.context("starting server processes")?;
    info!(servers = fleet.len(), "Server processes starting");

    let (supervisor, handle) = Supervisor::new(
        Arc::clone(&client),
        Arc::clone(&fleet),
        &config.directory,
    );
    let mut loop_task = tokio::spawn(supervisor.run());

    tokio::select! {
        joined = &mut loop_task => {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(outage)) => {
                    error!(%outage, "Directory unreachable past tolerance, giving up");
                    error!("Supervised server processes are NOT stopped by this exit; check them yourself");
                    std::process::exit(2);
                }
                Err(join_error) => {
                    return Err(anyhow::anyhow!("reconciliation loop panicked: {join_error}"));
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, stopping local servers");
            handle.stop().await;

            let grace = Duration::from_secs(config.shutdown_grace_secs);
            let wind_down = async {
                fleet.stop_all().await;
                // Let the spawned deregistration pushes drain before exiting
                tokio::time::sleep(Duration::from_secs(2)).await;
            };

            tokio::select! {
                _ = tokio::time::timeout(grace, wind_down) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Second interrupt: going silent");
                    fleet.blank_webhooks().await;
                    if let Err(error) = std::fs::write(&quiet_marker, b"") {
                        warn!(%error, "Could not write the silent marker");
                    }
                    fleet.stop_all().await;
                }
            }
            info!("Bye! Fleet supervision ended");
        }
    }

    Ok(())
}

/// Public address local server identities are composed from. Uses the
/// configured address when set, otherwise asks an echo service once at
/// startup. A fleet of only remote servers never needs one.
async fn resolve_public_address(config: &Config) -> anyhow::Result<String> {
    if let Some(address) = &config.public_address {
        return Ok(address.clone());
    }
    if !config
        .servers
        .iter()
        .any(|server| server.kind == ServerKind::Local)
    {
        return Ok(String::new());
    }

    info!("Discovering public address");
    let response = reqwest::Client::new()
        .get(PUBLIC_ADDRESS_SERVICE)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .context("reaching the public address service")?;
    if !response.status().is_success() {
        anyhow::bail!(
            "public address service returned HTTP {}",
            response.status()
        );
    }
    let address = response
        .text()
        .await
        .context("reading the public address")?
        .trim()
        .to_string();
    if address.is_empty() {
        anyhow::bail!("public address service returned an empty body");
    }
    info!("Public address: {}", address);
    Ok(address)
}
