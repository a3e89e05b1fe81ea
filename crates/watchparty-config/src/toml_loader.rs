//! TOML config file loading and creation.

use crate::schema::WatchPartyConfig;
use crate::validation;
use std::path::Path;
use tracing::{info, warn};
use watchparty_common::ConfigError;

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// After loading, the config is validated; if validation fails, a warning
/// is logged and the default config is returned.
pub fn load_from_path(path: &Path) -> Result<WatchPartyConfig, ConfigError> {
    let config = read_from_path(path)?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
        warn!("falling back to default config");
        return Ok(WatchPartyConfig::default());
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Parse a TOML file without validating it.
pub fn read_from_path(path: &Path) -> Result<WatchPartyConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: WatchPartyConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On macOS: `~/Library/Application Support/watchparty/config.toml`
/// On Linux: `~/.config/watchparty/config.toml`
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<WatchPartyConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(WatchPartyConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<std::path::PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("watchparty").join("config.toml"))
}

/// Create a default TOML config file with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

/// Generate the default TOML config content with comments.
fn default_config_toml() -> &'static str {
    r##"# Watch Party Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# bind_address = "0.0.0.0"
# port = 3000

[rooms]
# history_capacity = 50       # 1-10000 chat messages kept per room
# idle_ttl_secs = 86400       # empty rooms are reaped after this long
# reap_interval_secs = 3600

[connection]
# outbound_queue = 256        # 16-65536 events buffered per client

[client]
# server_url = "ws://127.0.0.1:3000"
# ice_servers = ["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"]
# connect_timeout_secs = 15

[logging]
# level = "info"              # trace, debug, info, warn, error
"##
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_nonexistent_returns_file_not_found() {
        let result = load_from_path(Path::new("/tmp/nonexistent_watchparty_config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_valid_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 4100

[rooms]
history_capacity = 20
"#,
        )
        .unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.rooms.history_capacity, 20);
        // Defaults preserved
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.rooms.idle_ttl_secs, 86_400);
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        let result = load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_config_with_invalid_values_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rooms]\nhistory_capacity = 0\n").unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.rooms.history_capacity, 50);
    }

    #[test]
    fn default_template_parses_to_defaults() {
        let config: WatchPartyConfig = toml::from_str(default_config_toml()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(validation::validate(&config).is_ok());
    }

    #[test]
    fn create_default_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        create_default_config(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[rooms]"));
        assert!(load_from_path(&path).is_ok());
    }
}
