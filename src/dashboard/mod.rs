//! Read-only status dashboard
//!
//! A small HTTP surface for operators: one HTML page and a few JSON
//! endpoints over live supervisor state. Strictly read-only; control stays
//! with process signals, not with the dashboard.

pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};

use crate::config::Config;
use crate::directory::DirectoryClient;
use crate::fleet::Fleet;

/// Everything the dashboard may show. All members are live shared views;
/// handlers never mutate them.
pub struct DashboardState {
    pub config: Config,
    pub public_address: String,
    pub fleet: Arc<Fleet>,
    pub client: Arc<DirectoryClient>,
    pub started_at: Instant,
}

pub type SharedState = Arc<DashboardState>;

impl DashboardState {
    pub fn new(
        config: Config,
        public_address: String,
        fleet: Arc<Fleet>,
        client: Arc<DirectoryClient>,
    ) -> Self {
        Self {
            config,
            public_address,
            fleet,
            client,
            started_at: Instant::now(),
        }
    }
}

/// Build the dashboard router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::api_status))
        .route("/api/servers", get(routes::api_servers))
        .route("/api/directory", get(routes::api_directory))
        .with_state(state)
}
