//! Authenticated directory client
//!
//! One client instance is shared by the supervisor loop, the fleet and the
//! dashboard. Per reconciliation cycle:
//! 1. `ensure_authenticated` refreshes the session ticket once it is older
//!    than its lifetime, creating the account on first contact
//! 2. `refresh` queries the title's game list under a hard deadline and
//!    folds the result through the grace table into the visible snapshot
//! 3. the fleet pushes a heartbeat for every listing it owns
//!
//! Push operations (heartbeats, deregistrations) are fire and forget: they
//! run on spawned tasks whose outcome is logged, and a cycle never waits on
//! them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;
use crate::deadline::deadline;

use super::records::{DirectoryServer, GamesEnvelope, WireGame};
use super::reconcile::{GraceTable, HealthClock};
use super::{DirectoryError, ACCOUNT_PREFIX, CLIENT_USER_AGENT, SDK_VERSION};

/// Cap on any single request, including abandoned query attempts that keep
/// running behind a tripped deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session ticket and when it was issued.
#[derive(Debug, Default)]
struct Session {
    ticket: Option<String>,
    issued_at: Option<Instant>,
}

/// Client for the matchmaking directory, holding everything the directory
/// has told us so far.
pub struct DirectoryClient {
    http: reqwest::Client,
    endpoint: String,
    title_id: String,
    query_timeout: Duration,
    auth_ttl: Duration,
    grace_cycles: u32,
    identities: RwLock<Vec<String>>,
    account_id: RwLock<String>,
    session: RwLock<Session>,
    snapshot: RwLock<Vec<DirectoryServer>>,
    grace: RwLock<GraceTable>,
    health: RwLock<HealthClock>,
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .default_headers(Self::wire_headers())
            .build()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            title_id: config.title_id.clone(),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            auth_ttl: Duration::from_secs(config.auth_ttl_secs),
            grace_cycles: config.grace_cycles,
            identities: RwLock::new(Vec::new()),
            account_id: RwLock::new(Self::derive_account_id(&[])),
            session: RwLock::new(Session::default()),
            snapshot: RwLock::new(Vec::new()),
            grace: RwLock::new(GraceTable::new()),
            health: RwLock::new(HealthClock::new()),
        })
    }

    /// Fixed headers the directory's request validation expects.
    fn wire_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("none"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert("X-PlayFabSDK", HeaderValue::from_static(SDK_VERSION));
        headers.insert(header::USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    /// The account identity is derived from the registered server identities
    /// in registration order, so the same fleet config always lands on the
    /// same directory account across restarts.
    fn derive_account_id(identities: &[String]) -> String {
        let mut hasher = Sha256::new();
        for identity in identities {
            hasher.update(identity.as_bytes());
        }
        format!("{}{:x}", ACCOUNT_PREFIX, hasher.finalize())
    }

    /// Add a server identity to the query filter and refold the account id.
    pub async fn register_identity(&self, identity: &str) {
        let account = {
            let mut identities = self.identities.write().await;
            if identities.iter().any(|existing| existing == identity) {
                return;
            }
            identities.push(identity.to_string());
            Self::derive_account_id(&identities)
        };
        *self.account_id.write().await = account;
        debug!(identity, "Registered server identity");
    }

    pub async fn account_id(&self) -> String {
        self.account_id.read().await.clone()
    }

    pub async fn identities(&self) -> Vec<String> {
        self.identities.read().await.clone()
    }

    /// Listings currently visible after grace-table filtering.
    pub async fn snapshot(&self) -> Vec<DirectoryServer> {
        self.snapshot.read().await.clone()
    }

    /// The visible listing for one server identity, if any.
    pub async fn get(&self, game_id: &str) -> Option<DirectoryServer> {
        self.snapshot
            .read()
            .await
            .iter()
            .find(|server| server.tags.game_id == game_id)
            .cloned()
    }

    pub async fn health(&self) -> HealthClock {
        *self.health.read().await
    }

    /// Remaining suppression cycles for an identity, if it is in grace.
    pub async fn grace_remaining(&self, game_id: &str) -> Option<u32> {
        self.grace.read().await.remaining(game_id)
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, DirectoryError> {
        let url = format!("{}{}?sdk={}", self.endpoint, path, SDK_VERSION);
        let mut request = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .body(body.to_string());
        if let Some(ticket) = self.session.read().await.ticket.clone() {
            request = request.header("X-Authorization", ticket);
        }
        request
            .send()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))
    }

    /// Make sure a usable session ticket is in place for this cycle.
    ///
    /// The ticket is refreshed once it is older than its lifetime. A directory
    /// that rejects the login with HTTP 400 has never seen this account, so
    /// the login is retried once with account creation enabled. A response the
    /// client cannot read is logged and left alone: the issue timestamp is
    /// only ever advanced by a real ticket, so the next cycle retries.
    pub async fn ensure_authenticated(&self) -> Result<(), DirectoryError> {
        {
            let session = self.session.read().await;
            if let (Some(_), Some(issued_at)) = (&session.ticket, session.issued_at) {
                if issued_at.elapsed() < self.auth_ttl {
                    return Ok(());
                }
            }
        }

        let account_id = self.account_id.read().await.clone();
        debug!(account = %account_id, "Refreshing directory session");

        let response = self.login(&account_id, false).await?;
        if response.status().as_u16() == 400 {
            debug!("Directory does not know this account, retrying with account creation");
            let response = self.login(&account_id, true).await?;
            match Self::extract_ticket(response).await {
                Some(ticket) => self.store_ticket(ticket).await,
                None => warn!("Directory account creation did not yield a session ticket"),
            }
            return Ok(());
        }

        match Self::extract_ticket(response).await {
            Some(ticket) => self.store_ticket(ticket).await,
            None => warn!("Directory login response held no usable session ticket"),
        }
        Ok(())
    }

    async fn login(
        &self,
        account_id: &str,
        create_account: bool,
    ) -> Result<reqwest::Response, DirectoryError> {
        let body = json!({
            "CreateAccount": create_account,
            "CustomId": account_id,
            "TitleId": self.title_id,
        });
        self.post("/Client/LoginWithCustomID", &body).await
    }

    async fn extract_ticket(response: reqwest::Response) -> Option<String> {
        let body: serde_json::Value = response.json().await.ok()?;
        body.get("data")?
            .get("SessionTicket")?
            .as_str()
            .map(str::to_owned)
    }

    async fn store_ticket(&self, ticket: String) {
        {
            let mut session = self.session.write().await;
            session.ticket = Some(ticket);
            session.issued_at = Some(Instant::now());
        }
        self.health.write().await.mark_auth();
        info!("Directory session refreshed");
    }

    /// Fetch the title's current game list, filtered to our identities.
    ///
    /// Bounded by the query deadline, and never touches stored state: a
    /// failed call leaves the previous snapshot exactly as it was.
    pub async fn query_games(&self) -> Result<Vec<DirectoryServer>, DirectoryError> {
        let filter = {
            let identities = self.identities.read().await;
            let includes: Vec<serde_json::Value> = identities
                .iter()
                .map(|game_id| json!({"Data": {"gameId": game_id}}))
                .collect();
            json!({"TagFilter": {"Includes": includes}})
        };

        deadline(self.query_timeout, async {
            let response = self.post("/Client/GetCurrentGames", &filter).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DirectoryError::Status(status.as_u16()));
            }
            let envelope: GamesEnvelope = response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
            let games = envelope
                .data
                .and_then(|data| data.games)
                .ok_or_else(|| {
                    DirectoryError::InvalidResponse("game list missing from response".to_string())
                })?;
            Ok(games.into_iter().map(WireGame::into_record).collect())
        })
        .await
        .map_err(|_| DirectoryError::Timeout)?
    }

    /// Run one query cycle: fetch, fold through the grace table, publish the
    /// merged snapshot and stamp the health clock. Nothing is stored unless
    /// the response parsed in full.
    pub async fn refresh(&self) -> Result<usize, DirectoryError> {
        let remote = self.query_games().await?;
        let reported = remote.len();
        let merged = self.grace.write().await.merge(remote);
        let visible = merged.len();
        *self.snapshot.write().await = merged;
        self.health.write().await.mark_query();
        debug!(reported, visible, "Directory snapshot refreshed");
        Ok(visible)
    }

    /// Re-announce one listing so the directory keeps it alive.
    ///
    /// The parameter values mirror what the directory itself reported.
    /// Capacity and password go out with their parsed types; the title's
    /// server-side script takes the occupancy count as a string.
    pub async fn heartbeat(&self, server: &DirectoryServer) -> Result<(), DirectoryError> {
        let body = json!({
            "FunctionName": "heartbeatDedicatedServer",
            "FunctionParameter": {
                "serverName": server.tags.server_name,
                "buildVersion": server.tags.game_build,
                "gameMode": server.tags.category,
                "ipAddress": server.server_address,
                "port": server.server_port,
                "matchmakerBuild": server.build_version,
                "maxPlayers": server.tags.max_players,
                "numPlayers": server.player_user_ids.len().to_string(),
                "lobbyId": server.lobby_id,
                "publicSigningKey": server.tags.public_signing_key,
                "requiresPassword": server.tags.requires_password,
            },
            "GeneratePlayStreamEvent": true,
        });

        let response = self.post("/Client/ExecuteCloudScript", &body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        if response.json::<serde_json::Value>().await.is_err() {
            warn!(lobby_id = %server.lobby_id, "Heartbeat acknowledged with an unreadable body");
        }
        Ok(())
    }

    /// Fire a heartbeat on its own task; the cycle does not wait for it.
    pub fn spawn_heartbeat(self: &Arc<Self>, server: DirectoryServer) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = client.heartbeat(&server).await {
                warn!(game_id = %server.tags.game_id, %error, "Directory heartbeat failed");
            }
        });
    }

    /// Take a server out of the public listing.
    ///
    /// The grace countdown starts unconditionally: local intent is
    /// authoritative, so even if every push fails the listing stays hidden
    /// from this process for the full window.
    pub async fn deregister(self: &Arc<Self>, game_id: &str) {
        self.grace.write().await.begin(game_id, self.grace_cycles);

        let targets: Vec<DirectoryServer> = self
            .snapshot
            .read()
            .await
            .iter()
            .filter(|server| server.tags.game_id == game_id)
            .cloned()
            .collect();

        if targets.is_empty() {
            debug!(game_id, "No visible listing to deregister");
        }
        for server in targets {
            info!(game_id, lobby_id = %server.lobby_id, "Deregistering server from the directory");
            let client = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(error) = client.push_deregistration(&server).await {
                    warn!(game_id = %server.tags.game_id, %error, "Directory deregistration push failed");
                }
            });
        }
    }

    async fn push_deregistration(&self, server: &DirectoryServer) -> Result<(), DirectoryError> {
        let body = json!({
            "FunctionName": "deregisterDedicatedServer",
            "FunctionParameter": { "lobbyId": server.lobby_id },
            "GeneratePlayStreamEvent": true,
        });

        let response = self.post("/Client/ExecuteCloudScript", &body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let _ = response.json::<serde_json::Value>().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DirectoryConfig {
        DirectoryConfig::default()
    }

    #[tokio::test]
    async fn test_account_id_is_deterministic_and_order_sensitive() {
        let a = DirectoryClient::new(&test_config()).unwrap();
        a.register_identity("10.0.0.1:8777").await;
        a.register_identity("10.0.0.2:8777").await;

        let b = DirectoryClient::new(&test_config()).unwrap();
        b.register_identity("10.0.0.1:8777").await;
        b.register_identity("10.0.0.2:8777").await;

        let c = DirectoryClient::new(&test_config()).unwrap();
        c.register_identity("10.0.0.2:8777").await;
        c.register_identity("10.0.0.1:8777").await;

        assert_eq!(a.account_id().await, b.account_id().await);
        assert_ne!(a.account_id().await, c.account_id().await);
        assert!(a.account_id().await.starts_with(ACCOUNT_PREFIX));
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_ignored() {
        let client = DirectoryClient::new(&test_config()).unwrap();
        client.register_identity("10.0.0.1:8777").await;
        let account = client.account_id().await;

        client.register_identity("10.0.0.1:8777").await;
        assert_eq!(client.identities().await.len(), 1);
        assert_eq!(client.account_id().await, account);
    }

    #[test]
    fn test_endpoint_derived_from_title() {
        let config = test_config();
        assert_eq!(config.endpoint(), "https://5EA1.playfabapi.com");
    }
}
