//! Directory wire payloads
//!
//! The directory speaks PascalCase JSON and flattens every server tag into a
//! string-valued map. Parsing is deliberately forgiving: a listing with
//! surprising tag contents is coerced field by field with explicit defaults
//! rather than dropped, so one odd entry never hides the rest of the fleet.

use serde::{Deserialize, Serialize};

/// One server as the directory currently lists it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryServer {
    pub region: String,
    pub lobby_id: String,
    pub build_version: String,
    pub game_mode: String,
    pub player_user_ids: Vec<String>,
    pub run_time: u64,
    pub state_code: u32,
    pub state: String,
    pub last_heartbeat: String,
    pub server_hostname: String,
    pub server_address: String,
    pub server_port: u16,
    pub tags: DirectoryServerTags,
}

/// Typed view of a listing's tag map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryServerTags {
    pub max_players: u32,
    pub num_players: u32,
    pub is_full: bool,
    pub game_id: String,
    pub game_build: String,
    pub server_name: String,
    pub category: String,
    pub public_signing_key: String,
    pub requires_password: bool,
}

/// Outer shape of a game-list response.
#[derive(Debug, Deserialize)]
pub(crate) struct GamesEnvelope {
    pub data: Option<GamesData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GamesData {
    #[serde(rename = "Games")]
    pub games: Option<Vec<WireGame>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct WireGame {
    pub region: Option<String>,
    #[serde(rename = "LobbyID")]
    pub lobby_id: Option<String>,
    pub build_version: Option<String>,
    pub game_mode: Option<String>,
    pub player_user_ids: Option<Vec<String>>,
    pub run_time: Option<u64>,
    pub game_server_state: Option<u32>,
    pub game_server_state_enum: Option<String>,
    pub tags: Option<WireTags>,
    pub last_heartbeat: Option<String>,
    pub server_hostname: Option<String>,
    #[serde(rename = "ServerIPV4Address")]
    pub server_ipv4_address: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireTags {
    pub max_players: Option<String>,
    pub num_players: Option<String>,
    pub is_full: Option<String>,
    pub game_id: Option<String>,
    pub game_build: Option<String>,
    pub server_name: Option<String>,
    pub category: Option<String>,
    pub public_signing_key: Option<String>,
    pub requires_password: Option<String>,
}

impl WireGame {
    pub(crate) fn into_record(self) -> DirectoryServer {
        let tags = self.tags.unwrap_or_default();
        DirectoryServer {
            region: self.region.unwrap_or_default(),
            lobby_id: self.lobby_id.unwrap_or_default(),
            build_version: self.build_version.unwrap_or_default(),
            game_mode: self.game_mode.unwrap_or_default(),
            player_user_ids: self.player_user_ids.unwrap_or_default(),
            run_time: self.run_time.unwrap_or_default(),
            state_code: self.game_server_state.unwrap_or_default(),
            state: self.game_server_state_enum.unwrap_or_default(),
            last_heartbeat: self.last_heartbeat.unwrap_or_default(),
            server_hostname: self.server_hostname.unwrap_or_default(),
            server_address: self.server_ipv4_address.unwrap_or_default(),
            server_port: self.server_port.unwrap_or_default(),
            tags: DirectoryServerTags {
                max_players: coerce_u32(tags.max_players.as_deref()),
                num_players: coerce_u32(tags.num_players.as_deref()),
                is_full: coerce_bool(tags.is_full.as_deref()),
                game_id: tags.game_id.unwrap_or_default(),
                game_build: tags.game_build.unwrap_or_default(),
                server_name: tags.server_name.unwrap_or_default(),
                category: tags.category.unwrap_or_default(),
                public_signing_key: tags.public_signing_key.unwrap_or_default(),
                requires_password: coerce_bool(tags.requires_password.as_deref()),
            },
        }
    }
}

fn coerce_u32(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn coerce_bool(raw: Option<&str>) -> bool {
    raw.map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
