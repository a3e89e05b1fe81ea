//! Native peer-connection seam.
//!
//! The mesh drives negotiation through these traits; a WebRTC stack plugs in
//! behind them. Native callbacks come back as [`PeerEvent`]s on the channel
//! handed to the factory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use watchparty_common::{ConnectionId, IceCandidate, PeerError};

use super::media::LocalTrack;

// ---------------------------------------------------------------------------
// Session Descriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
    /// Discard a pending local offer and return to the stable state.
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn rollback() -> Self {
        Self {
            kind: SdpKind::Rollback,
            sdp: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Peer Connection
// ---------------------------------------------------------------------------

/// One native connection to one remote participant.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), PeerError>;

    /// Produce an offer SDP covering every attached track.
    async fn create_offer(&self) -> Result<String, PeerError>;

    /// Produce an answer SDP. Only valid after a remote offer was applied.
    async fn create_answer(&self) -> Result<String, PeerError>;

    /// Apply a local description. [`SdpKind::Rollback`] discards the
    /// pending local offer and keeps the established session.
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Tear down the connection. Further events from it are ignored.
    async fn close(&self);
}

/// Creates native connections configured with the given ICE servers.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[String],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, PeerError>;
}

// ---------------------------------------------------------------------------
// Native Callbacks
// ---------------------------------------------------------------------------

/// Transport state reported by the native connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEventKind {
    /// A local ICE candidate was gathered and must reach the remote side.
    IceCandidate(IceCandidate),
    TrackAdded { stream_id: String, track_id: String },
    TrackRemoved { stream_id: String, track_id: String },
    StateChanged(ConnectionState),
}

/// A native callback, tagged with the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub remote: ConnectionId,
    /// Distinguishes a recreated connection from the one it replaced.
    pub generation: u64,
    pub kind: PeerEventKind,
}

/// Handle a native connection uses to report callbacks. Non-blocking, so it
/// can be called from native callback threads.
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    remote: ConnectionId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSender {
    pub(crate) fn new(
        remote: ConnectionId,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            remote,
            generation,
            tx,
        }
    }

    pub fn remote(&self) -> &ConnectionId {
        &self.remote
    }

    /// Returns false once the mesh has gone away.
    pub fn send(&self, kind: PeerEventKind) -> bool {
        self.tx
            .send(PeerEvent {
                remote: self.remote.clone(),
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}
