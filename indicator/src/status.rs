use gamemode_indicator::{ConnectionState, GameModeClient, ProcessRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;

/// What the indicator shows.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    /// The GameMode proxy is still being resolved.
    Connecting,
    /// No proxy could be obtained; the daemon is not installed or the bus is down.
    Unavailable,
    /// Attached, no game holds GameMode.
    Inactive,
    /// Attached, at least one game holds GameMode.
    Active,
}

impl IndicatorState {
    pub fn from_client(connection: ConnectionState, client_count: i32) -> Self {
        match connection {
            ConnectionState::Connecting => IndicatorState::Connecting,
            ConnectionState::Unavailable | ConnectionState::Closed => IndicatorState::Unavailable,
            ConnectionState::Connected if client_count > 0 => IndicatorState::Active,
            ConnectionState::Connected => IndicatorState::Inactive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IndicatorState::Connecting => "Connecting to GameMode",
            IndicatorState::Unavailable => "GameMode is Not Available",
            IndicatorState::Inactive => "GameMode is Off",
            IndicatorState::Active => "GameMode is On",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct GameEntry {
    pub pid: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub object_path: String,
}

/// Indicator view written to `$XDG_RUNTIME_DIR/gamemode-indicator/status.toml`.
/// Panels and bars read this file (read-only) to render the indicator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IndicatorStatus {
    /// Indicator binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: IndicatorState,
    pub label: String,
    /// Live `ClientCount` from the daemon.
    pub client_count: i32,
    /// False when the icon is configured to hide while inactive.
    pub icon_visible: bool,
    /// Tint for the current state, normalized to `rgb(r,g,b)`.
    pub icon_color: String,
    /// Whether the desktop should hold do-not-disturb right now.
    pub do_not_disturb: bool,
    /// RFC 3339 timestamp of the last active/inactive transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    /// Registered games, sorted by PID. May lag behind `client_count`.
    #[serde(default)]
    pub games: Vec<GameEntry>,
}

impl IndicatorStatus {
    /// Constructs the initial status while the client is still attaching.
    pub fn new(config: &Config) -> Self {
        Self::build(ConnectionState::Connecting, 0, HashMap::new(), config, None)
    }

    /// Snapshot of `client` rendered with `config`.
    pub fn from_client(
        client: &GameModeClient,
        config: &Config,
        last_changed: Option<String>,
    ) -> Self {
        Self::build(
            client.connection_state(),
            client.client_count(),
            client.registered_processes(),
            config,
            last_changed,
        )
    }

    pub fn build(
        connection: ConnectionState,
        client_count: i32,
        processes: HashMap<i32, ProcessRecord>,
        config: &Config,
        last_changed: Option<String>,
    ) -> Self {
        let state = IndicatorState::from_client(connection, client_count);
        let active = state == IndicatorState::Active;
        let icon_color = if active {
            config.active_rgb()
        } else {
            config.inactive_rgb()
        };

        let mut games: Vec<GameEntry> = processes
            .into_iter()
            .map(|(pid, record)| GameEntry {
                pid,
                name: record.display_name,
                object_path: record.object_path,
            })
            .collect();
        games.sort_by_key(|g| g.pid);

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state,
            label: state.label().to_string(),
            client_count,
            icon_visible: active || !config.show_icon_only_when_active,
            icon_color: icon_color.to_css(),
            do_not_disturb: active && config.enable_do_not_disturb,
            last_changed,
            games,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged; a status write failure never stops the indicator.
pub fn write_status(path: &Path, status: &IndicatorStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, dir = %parent.display(), "Failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!(error = %e, "Failed to write status file");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
    }
}
