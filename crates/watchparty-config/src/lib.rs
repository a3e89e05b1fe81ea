//! Watch-party configuration system.
//!
//! Provides TOML-based configuration shared by the relay server and the
//! client session. All config sections use sensible defaults so partial
//! configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use watchparty_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ClientConfig, ConnectionConfig, LogLevel, LoggingConfig, RoomsConfig, ServerConfig,
    WatchPartyConfig, CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use watchparty_common::ConfigError;

/// Load `config.toml` from the OS config directory, creating a default if
/// none exists, and validate the result.
pub fn load_config() -> Result<WatchPartyConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load from an explicit path when given, otherwise from the default location.
///
/// An explicit file with out-of-range values is an error rather than being
/// replaced by defaults.
pub fn load_config_from(path: Option<&Path>) -> Result<WatchPartyConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = toml_loader::read_from_path(path)?;
            validation::validate(&config)?;
            tracing::info!("loaded config from {}", path.display());
            Ok(config)
        }
        None => load_config(),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &WatchPartyConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
