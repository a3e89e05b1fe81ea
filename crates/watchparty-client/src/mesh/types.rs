//! Mesh types: per-peer negotiation state and the events surfaced to the session.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use watchparty_common::{ConnectionId, MediaSource, SignalPayload};

use super::peer::{ConnectionState, PeerConnection};

// ---------------------------------------------------------------------------
// Peer State
// ---------------------------------------------------------------------------

/// Which side of the current offer/answer exchange we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Offerer,
    Answerer,
}

/// Negotiation state of the connection to one remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No record exists.
    NoConnection,
    Negotiating(NegotiationRole),
    Connected,
    /// The participant left; the record is gone until a new signal arrives.
    Closed,
}

/// A remote media stream and the tracks it currently carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_ids: Vec<String>,
}

/// Output of the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// Must be sent to `target` through the signaling channel.
    Signal {
        target: ConnectionId,
        signal: SignalPayload,
    },
    StreamAdded {
        remote: ConnectionId,
        stream: RemoteStream,
    },
    StreamRemoved {
        remote: ConnectionId,
        stream_id: String,
    },
    ConnectionStateChanged {
        remote: ConnectionId,
        state: ConnectionState,
    },
    MediaChanged {
        source: MediaSource,
        enabled: bool,
    },
    MediaError {
        source: MediaSource,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub ice_servers: Vec<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ice_servers: watchparty_config::ClientConfig::default().ice_servers,
        }
    }
}

impl From<&watchparty_config::ClientConfig> for MeshConfig {
    fn from(config: &watchparty_config::ClientConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Peer Record
// ---------------------------------------------------------------------------

pub(crate) struct PeerRecord {
    pub(crate) connection: Arc<dyn PeerConnection>,
    pub(crate) generation: u64,
    pub(crate) state: PeerState,
    /// At least one negotiation completed on this connection.
    pub(crate) established: bool,
    /// Local track ids already attached to this connection.
    pub(crate) attached: HashSet<String>,
    /// A track was attached mid-negotiation; offer again once it settles.
    pub(crate) renegotiate_pending: bool,
    pub(crate) remote_streams: BTreeMap<String, BTreeSet<String>>,
}

impl PeerRecord {
    pub(crate) fn new(connection: Arc<dyn PeerConnection>, generation: u64, state: PeerState) -> Self {
        Self {
            connection,
            generation,
            state,
            established: false,
            attached: HashSet::new(),
            renegotiate_pending: false,
            remote_streams: BTreeMap::new(),
        }
    }

    pub(crate) fn is_negotiating(&self) -> bool {
        matches!(self.state, PeerState::Negotiating(_))
    }
}
