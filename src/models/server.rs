// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Online state reported by BattleMetrics for a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Online,
    Offline,
    Dead,
    Removed,
    Invalid,
    Other(String),
}

impl ServerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "online" => Self::Online,
            "offline" => Self::Offline,
            "dead" => Self::Dead,
            "removed" => Self::Removed,
            "invalid" => Self::Invalid,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Dead => "dead",
            Self::Removed => "removed",
            Self::Invalid => "invalid",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServerStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Point-in-time attributes of one external server. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    pub players: u32,
    pub max_players: u32,
    pub name: String,
    pub status: ServerStatus,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub country: Option<String>,
    pub rank: Option<u32>,
    pub game: Option<String>,
}

impl ServerSnapshot {
    pub fn is_offline(&self) -> bool {
        self.status == ServerStatus::Offline
    }
}

/// One search hit from the server listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub snapshot: ServerSnapshot,
}

/// A tracked server entry, keyed by its BattleMetrics id inside a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedServer {
    pub channel_id: String,
    /// Operator-chosen label, or the fetched name at registration time.
    pub name: String,
    #[serde(default)]
    pub registered_by: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub registered_at: u64,
}

impl TrackedServer {
    pub fn label(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(self.name.as_str())
        }
    }
}

pub const DEFAULT_CHANNEL_FORMAT: &str = "[{players}/{max}] {name}";
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 60;

/// Process-wide settings that admin commands can change at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub api_token: Option<String>,
    pub update_interval_secs: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            api_token: None,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
        }
    }
}
