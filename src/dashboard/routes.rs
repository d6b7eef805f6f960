//! Dashboard HTTP routes
//!
//! Handlers for the status page and its JSON API

use axum::{
    extract::State,
    response::{Html, IntoResponse, Json},
};
use serde::Serialize;

use super::SharedState;
use crate::directory::DirectoryServer;
use crate::fleet::ServerStatus;

/// Dashboard index page
pub async fn index() -> impl IntoResponse {
    Html(include_str!("../../static/dashboard.html"))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// Fleet status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub hostname: String,
    pub owner: String,
    pub public_address: String,
    pub account_id: String,
    pub uptime_secs: u64,
    pub server_count: usize,
    pub listed_count: usize,
    pub last_query_age_secs: u64,
    pub last_auth_age_secs: u64,
}

/// GET /api/status
pub async fn api_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let health = state.client.health().await;
    let listed_count = state.client.snapshot().await.len();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
        owner: state.config.owner.clone(),
        public_address: state.public_address.clone(),
        account_id: state.client.account_id().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
        server_count: state.fleet.len(),
        listed_count,
        last_query_age_secs: health.last_successful_query.elapsed().as_secs(),
        last_auth_age_secs: health.last_auth.elapsed().as_secs(),
    })
}

/// GET /api/servers
pub async fn api_servers(State(state): State<SharedState>) -> Json<Vec<ServerStatus>> {
    Json(state.fleet.statuses().await)
}

/// GET /api/directory
pub async fn api_directory(State(state): State<SharedState>) -> Json<Vec<DirectoryServer>> {
    Json(state.client.snapshot().await)
}
