pub mod errors;
pub mod id;
pub mod media;
pub mod protocol;

pub use errors::{ConfigError, MediaError, PeerError, SignalingError, WatchPartyError};
pub use id::{new_id, now_millis, ConnectionId};
pub use media::MediaSource;
pub use protocol::{
    ChatMessage, ClientEvent, IceCandidate, PeerInfo, ServerEvent, SignalPayload, UserProfile,
};

pub type Result<T> = std::result::Result<T, WatchPartyError>;
