//! Directory client integration tests against an in-process stand-in
//!
//! The stand-in speaks just enough of the directory's wire contract to
//! exercise login, queries, heartbeats and deregistration over real HTTP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use fleetward::config::DirectoryConfig;
use fleetward::directory::{DirectoryClient, DirectoryError, DirectoryServer, DirectoryServerTags};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> Arc<DirectoryClient> {
    let mut config = DirectoryConfig::default();
    config.base_url = Some(format!("http://{addr}"));
    Arc::new(DirectoryClient::new(&config).unwrap())
}

fn games_body(games: Value) -> Value {
    json!({
        "code": 200,
        "status": "OK",
        "data": { "Games": games, "PlayerCount": 0, "GameCount": 0 }
    })
}

fn listing(game_id: &str, lobby_id: &str) -> Value {
    json!({
        "Region": "USEast",
        "LobbyID": lobby_id,
        "BuildVersion": "1.19.143.0",
        "GameMode": "coop",
        "PlayerUserIds": [],
        "RunTime": 3,
        "GameServerState": 1,
        "GameServerStateEnum": "Open",
        "Tags": {
            "maxPlayers": "8",
            "numPlayers": "0",
            "isFull": "false",
            "gameId": game_id,
            "gameBuild": "1.19.143.0",
            "serverName": "alpha",
            "category": "coop",
            "publicSigningKey": "key",
            "requiresPassword": "false"
        },
        "LastHeartbeat": "2024-01-01T00:00:00Z",
        "ServerHostname": "host",
        "ServerIPV4Address": "10.0.0.1",
        "ServerPort": 8777
    })
}

/// An unknown account gets exactly one creation retry, and the fresh ticket
/// rides along on the queries that follow.
#[tokio::test]
async fn test_login_creates_account_on_unknown_and_attaches_ticket() {
    let logins: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let query_auth: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));

    let login_sink = logins.clone();
    let auth_sink = query_auth.clone();
    let app = Router::new()
        .route(
            "/Client/LoginWithCustomID",
            post(move |body: String| {
                let login_sink = login_sink.clone();
                async move {
                    let body: Value = serde_json::from_str(&body).unwrap();
                    let create = body["CreateAccount"].as_bool().unwrap();
                    login_sink.lock().await.push(body);
                    if create {
                        Json(json!({"data": {"SessionTicket": "ticket-1"}})).into_response()
                    } else {
                        StatusCode::BAD_REQUEST.into_response()
                    }
                }
            }),
        )
        .route(
            "/Client/GetCurrentGames",
            post(move |headers: HeaderMap, _body: String| {
                let auth_sink = auth_sink.clone();
                async move {
                    let ticket = headers
                        .get("X-Authorization")
                        .map(|value| value.to_str().unwrap().to_string());
                    auth_sink.lock().await.push(ticket);
                    Json(games_body(json!([])))
                }
            }),
        );
    let addr = serve(app).await;
    let client = client_for(addr);

    client.ensure_authenticated().await.unwrap();

    {
        let logins = logins.lock().await;
        assert_eq!(logins.len(), 2);
        assert_eq!(logins[0]["CreateAccount"], json!(false));
        assert_eq!(logins[1]["CreateAccount"], json!(true));
        assert_eq!(logins[0]["TitleId"], json!("5EA1"));
        let custom_id = logins[0]["CustomId"].as_str().unwrap();
        assert!(custom_id.starts_with("fleetward_"));
        assert_eq!(logins[1]["CustomId"].as_str().unwrap(), custom_id);
    }

    client.refresh().await.unwrap();
    client.ensure_authenticated().await.unwrap();

    // Still two logins: the stored ticket is fresh, no new attempt.
    assert_eq!(logins.lock().await.len(), 2);
    assert_eq!(
        *query_auth.lock().await,
        vec![Some("ticket-1".to_string())]
    );
}

/// A login response the client cannot read is logged and skipped, never
/// stored; the next cycle simply tries again.
#[tokio::test]
async fn test_unreadable_login_leaves_session_unset_and_cycle_alive() {
    let login_calls = Arc::new(AtomicUsize::new(0));
    let calls = login_calls.clone();
    let app = Router::new().route(
        "/Client/LoginWithCustomID",
        post(move |_body: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "surprise, not json"
            }
        }),
    );
    let addr = serve(app).await;
    let client = client_for(addr);

    client.ensure_authenticated().await.unwrap();
    assert_eq!(login_calls.load(Ordering::SeqCst), 1);

    client.ensure_authenticated().await.unwrap();
    assert_eq!(login_calls.load(Ordering::SeqCst), 2);
}

/// A directory that rejects the login and the create-account retry alike
/// leaves the session unset without killing the cycle; the next cycle
/// starts the whole login sequence over.
#[tokio::test]
async fn test_rejected_account_creation_leaves_session_unset_and_cycle_alive() {
    let login_calls = Arc::new(AtomicUsize::new(0));
    let calls = login_calls.clone();
    let app = Router::new().route(
        "/Client/LoginWithCustomID",
        post(move |_body: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                StatusCode::BAD_REQUEST
            }
        }),
    );
    let addr = serve(app).await;
    let client = client_for(addr);

    // First pass burns the plain login and the single create-account retry.
    client.ensure_authenticated().await.unwrap();
    assert_eq!(login_calls.load(Ordering::SeqCst), 2);

    // Nothing was stored, so the next pass repeats both attempts.
    client.ensure_authenticated().await.unwrap();
    assert_eq!(login_calls.load(Ordering::SeqCst), 4);
}

/// A failed cycle must not disturb what the last good cycle stored.
#[tokio::test]
async fn test_failed_query_leaves_previous_snapshot_untouched() {
    let failing = Arc::new(AtomicUsize::new(0));
    let filters: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let failing_flag = failing.clone();
    let filter_sink = filters.clone();
    let app = Router::new().route(
        "/Client/GetCurrentGames",
        post(move |body: String| {
            let failing_flag = failing_flag.clone();
            let filter_sink = filter_sink.clone();
            async move {
                filter_sink
                    .lock()
                    .await
                    .push(serde_json::from_str(&body).unwrap());
                if failing_flag.load(Ordering::SeqCst) == 1 {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                } else {
                    Json(games_body(json!([listing("10.0.0.1:8777", "lobby-1")])))
                        .into_response()
                }
            }
        }),
    );
    let addr = serve(app).await;
    let client = client_for(addr);
    client.register_identity("10.0.0.1:8777").await;

    assert_eq!(client.refresh().await.unwrap(), 1);
    assert_eq!(client.snapshot().await.len(), 1);
    let marked = client.health().await.last_successful_query;

    failing.store(1, Ordering::SeqCst);
    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, DirectoryError::Status(500)));
    assert_eq!(
        client.snapshot().await.len(),
        1,
        "stale snapshot must survive a failed cycle"
    );
    assert_eq!(
        client.health().await.last_successful_query,
        marked,
        "a failed query must not advance the health clock"
    );

    let filters = filters.lock().await;
    assert_eq!(
        filters[0]["TagFilter"]["Includes"],
        json!([{"Data": {"gameId": "10.0.0.1:8777"}}])
    );
}

/// A hung directory is reported as a timeout long before the next cycle.
#[tokio::test]
async fn test_slow_query_times_out_within_its_bound() {
    let app = Router::new().route(
        "/Client/GetCurrentGames",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(games_body(json!([])))
        }),
    );
    let addr = serve(app).await;

    let mut config = DirectoryConfig::default();
    config.base_url = Some(format!("http://{addr}"));
    config.query_timeout_ms = 200;
    let client = Arc::new(DirectoryClient::new(&config).unwrap());

    let started = Instant::now();
    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, DirectoryError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Heartbeat parameters mirror the listing. Capacity stays a number and the
/// password flag a boolean; only the occupancy count goes out as a string.
#[tokio::test]
async fn test_heartbeat_payload_mirrors_the_listing() {
    let pushes: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = pushes.clone();
    let app = Router::new().route(
        "/Client/ExecuteCloudScript",
        post(move |body: String| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(serde_json::from_str(&body).unwrap());
                Json(json!({"code": 200}))
            }
        }),
    );
    let addr = serve(app).await;
    let client = client_for(addr);

    let server = DirectoryServer {
        lobby_id: "lobby-9".to_string(),
        build_version: "mm-7".to_string(),
        player_user_ids: vec!["p1".to_string(), "p2".to_string()],
        server_address: "10.0.0.1".to_string(),
        server_port: 8777,
        tags: DirectoryServerTags {
            max_players: 8,
            num_players: 2,
            is_full: false,
            game_id: "10.0.0.1:8777".to_string(),
            game_build: "1.19.143.0".to_string(),
            server_name: "alpha".to_string(),
            category: "coop".to_string(),
            public_signing_key: "key".to_string(),
            requires_password: false,
        },
        ..DirectoryServer::default()
    };

    client.heartbeat(&server).await.unwrap();

    let pushes = pushes.lock().await;
    assert_eq!(pushes.len(), 1);
    let push = &pushes[0];
    assert_eq!(push["FunctionName"], json!("heartbeatDedicatedServer"));
    assert_eq!(push["GeneratePlayStreamEvent"], json!(true));

    let params = &push["FunctionParameter"];
    assert_eq!(params["serverName"], json!("alpha"));
    assert_eq!(params["buildVersion"], json!("1.19.143.0"));
    assert_eq!(params["gameMode"], json!("coop"));
    assert_eq!(params["ipAddress"], json!("10.0.0.1"));
    assert_eq!(params["port"], json!(8777));
    assert_eq!(params["matchmakerBuild"], json!("mm-7"));
    assert_eq!(params["maxPlayers"], json!(8));
    assert_eq!(params["numPlayers"], json!("2"));
    assert_eq!(params["lobbyId"], json!("lobby-9"));
    assert_eq!(params["publicSigningKey"], json!("key"));
    assert_eq!(params["requiresPassword"], json!(false));
}

/// Deregistration hides the listing for the whole grace window even when
/// every push is rejected; local intent wins over the directory's echoes.
#[tokio::test]
async fn test_deregistration_suppresses_echoes_for_the_full_window() {
    let pushes: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = pushes.clone();
    let app = Router::new()
        .route(
            "/Client/GetCurrentGames",
            post(|_body: String| async {
                Json(games_body(json!([listing("10.0.0.1:8777", "lobby-1")])))
            }),
        )
        .route(
            "/Client/ExecuteCloudScript",
            post(move |body: String| {
                let sink = sink.clone();
                async move {
                    sink.lock().await.push(serde_json::from_str(&body).unwrap());
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
    let addr = serve(app).await;
    let client = client_for(addr);
    client.register_identity("10.0.0.1:8777").await;

    assert_eq!(client.refresh().await.unwrap(), 1);

    client.deregister("10.0.0.1:8777").await;
    assert_eq!(client.grace_remaining("10.0.0.1:8777").await, Some(4));

    // The push went out, even though the stand-in rejected it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    {
        let pushes = pushes.lock().await;
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0]["FunctionName"], json!("deregisterDedicatedServer"));
        assert_eq!(pushes[0]["FunctionParameter"]["lobbyId"], json!("lobby-1"));
    }

    // Four suppressed cycles, then the still-reported listing surfaces again.
    for cycle in 0..4 {
        assert_eq!(client.refresh().await.unwrap(), 0, "cycle {cycle}");
    }
    assert_eq!(client.refresh().await.unwrap(), 1);
    assert_eq!(client.grace_remaining("10.0.0.1:8777").await, None);
}
