//! Watch-party client: relay connection, room session and peer mesh.

pub mod mesh;
pub mod session;
pub mod signaling;

pub use mesh::{
    LocalTrack, MediaDevices, MeshConfig, MeshEvent, PeerConnection, PeerConnectionFactory,
    PeerMesh, PeerState,
};
pub use session::{RoomCommand, RoomHandle, RoomSession, SessionEvent};
pub use signaling::{SignalingClient, SignalingEvent};
