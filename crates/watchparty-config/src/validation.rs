//! Full configuration validation.
//!
//! Validates numeric ranges and URL schemes, collecting every problem into a
//! single error.

use crate::schema::WatchPartyConfig;
use watchparty_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &WatchPartyConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    if config.server.bind_address.trim().is_empty() {
        errors.push("server.bind_address must not be empty".into());
    }

    // Rooms
    validate_range(&mut errors, "rooms.history_capacity", config.rooms.history_capacity, 1, 10_000);
    validate_range_u64(&mut errors, "rooms.idle_ttl_secs", config.rooms.idle_ttl_secs, 60, 30 * 86_400);
    validate_range_u64(&mut errors, "rooms.reap_interval_secs", config.rooms.reap_interval_secs, 1, 86_400);

    // Connection
    validate_range(&mut errors, "connection.outbound_queue", config.connection.outbound_queue, 16, 65_536);

    // Client
    let url = &config.client.server_url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(format!("client.server_url = {url:?} must start with ws:// or wss://"));
    }
    for server in &config.client.ice_servers {
        if !["stun:", "turn:", "turns:"].iter().any(|p| server.starts_with(*p)) {
            errors.push(format!("client.ice_servers entry {server:?} is not a stun:/turn: URL"));
        }
    }
    validate_range_u64(&mut errors, "client.connect_timeout_secs", config.client.connect_timeout_secs, 1, 120);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

/// Push an error if `value` is outside `[min, max]`.
fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

fn validate_range_u64(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
