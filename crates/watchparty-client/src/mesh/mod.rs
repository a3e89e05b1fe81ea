//! Client-side peer mesh: one WebRTC connection per remote participant.

pub mod media;
pub mod orchestrator;
pub mod peer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use media::{LocalMedia, LocalTrack, MediaDevices};
pub use orchestrator::{MeshChannels, PeerMesh};
pub use peer::{
    ConnectionState, PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventKind,
    PeerEventSender, SdpKind, SessionDescription,
};
pub use types::{MeshConfig, MeshEvent, NegotiationRole, PeerState, RemoteStream};
