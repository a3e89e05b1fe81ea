use std::path::PathBuf;

use crate::media::MediaSource;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {0}s")]
    Timeout(u64),

    #[error("signaling channel closed")]
    Closed,

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("create peer connection failed: {0}")]
    Create(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("ice candidate rejected: {0}")]
    Ice(String),

    #[error("track error: {0}")]
    Track(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("{0} permission denied")]
    PermissionDenied(MediaSource),

    #[error("{0} device unavailable: {1}")]
    Unavailable(MediaSource, String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchPartyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
