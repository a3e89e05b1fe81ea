//! Configuration schema types for the watch-party relay and client.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Server Config
// =============================================================================

/// Where the relay listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

// =============================================================================
// Rooms Config
// =============================================================================

/// Room retention and history limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Chat messages kept per room; older ones are dropped.
    pub history_capacity: u32,
    /// How long an empty room keeps its history before it is reaped.
    pub idle_ttl_secs: u64,
    /// How often the idle-room reaper runs.
    pub reap_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            idle_ttl_secs: 24 * 60 * 60,
            reap_interval_secs: 60 * 60,
        }
    }
}

impl RoomsConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

// =============================================================================
// Connection Config
// =============================================================================

/// Per-connection limits on the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Events buffered for one slow client before new ones are dropped.
    pub outbound_queue: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
        }
    }
}

// =============================================================================
// Client Config
// =============================================================================

/// Settings used by the client session and peer mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    pub server_url: String,
    /// STUN/TURN URLs handed to every peer connection.
    pub ice_servers: Vec<String>,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000".into(),
            ice_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            connect_timeout_secs: 15,
        }
    }
}

// =============================================================================
// Logging Config
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchPartyConfig {
    pub server: ServerConfig,
    pub rooms: RoomsConfig,
    pub connection: ConnectionConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rooms_match_reference_limits() {
        let config = WatchPartyConfig::default();
        assert_eq!(config.rooms.history_capacity, 50);
        assert_eq!(config.rooms.idle_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.rooms.reap_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn default_server_listens_on_3000() {
        let config = WatchPartyConfig::default();
        assert_eq!(config.server.listen_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn default_client_points_at_local_relay() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:3000");
        assert_eq!(config.ice_servers.len(), 2);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: WatchPartyConfig = toml::from_str(
            r#"
[rooms]
history_capacity = 10
"#,
        )
        .unwrap();
        assert_eq!(config.rooms.history_capacity, 10);
        assert_eq!(config.rooms.idle_ttl_secs, 86_400);
        assert_eq!(config.connection.outbound_queue, 256);
    }

    #[test]
    fn log_level_parses_lowercase() {
        let config: WatchPartyConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.level.as_str(), "debug");
    }
}
