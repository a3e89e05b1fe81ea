//! Peer mesh orchestrator: one negotiated connection per remote participant.
//!
//! The mesh is driven from a single task: every input (room events, signals,
//! native callbacks, local media toggles) is handled to completion before the
//! next, so negotiation steps for one peer never interleave. Everything the
//! mesh wants the outside world to do comes back as a [`MeshEvent`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use watchparty_common::{
    ConnectionId, IceCandidate, MediaError, MediaSource, PeerError, PeerInfo, SignalPayload,
    UserProfile,
};

use super::media::{LocalMedia, LocalTrack, MediaDevices};
use super::peer::{
    ConnectionState, PeerConnectionFactory, PeerEvent, PeerEventKind, PeerEventSender,
    SessionDescription,
};
use super::types::{MeshConfig, MeshEvent, NegotiationRole, PeerRecord, PeerState, RemoteStream};

/// How many departed peers are remembered as [`PeerState::Closed`].
const CLOSED_MEMORY: usize = 64;

/// Receiving ends handed back by [`PeerMesh::new`].
pub struct MeshChannels {
    /// Signals to send and notifications for the UI.
    pub events: mpsc::UnboundedReceiver<MeshEvent>,
    /// Native callbacks; feed each one back into [`PeerMesh::on_peer_event`].
    pub peer_events: mpsc::UnboundedReceiver<PeerEvent>,
}

pub struct PeerMesh {
    config: MeshConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    devices: Arc<dyn MediaDevices>,
    local_id: Option<ConnectionId>,
    /// Everyone in the room other than us, whether or not we have a record.
    participants: BTreeMap<ConnectionId, UserProfile>,
    peers: HashMap<ConnectionId, PeerRecord>,
    /// Recently departed peers, oldest first.
    closed: VecDeque<ConnectionId>,
    media: LocalMedia,
    next_generation: u64,
    event_tx: mpsc::UnboundedSender<MeshEvent>,
    peer_event_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerMesh {
    pub fn new(
        config: MeshConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> (Self, MeshChannels) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (peer_event_tx, peer_events) = mpsc::unbounded_channel();
        let mesh = Self {
            config,
            factory,
            devices,
            local_id: None,
            participants: BTreeMap::new(),
            peers: HashMap::new(),
            closed: VecDeque::new(),
            media: LocalMedia::default(),
            next_generation: 0,
            event_tx,
            peer_event_tx,
        };
        (mesh, MeshChannels { events, peer_events })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn set_local_id(&mut self, id: ConnectionId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&ConnectionId> {
        self.local_id.as_ref()
    }

    pub fn peer_state(&self, remote: &ConnectionId) -> PeerState {
        match self.peers.get(remote) {
            Some(record) => record.state,
            None if self.closed.contains(remote) => PeerState::Closed,
            None => PeerState::NoConnection,
        }
    }

    pub fn participants(&self) -> Vec<ConnectionId> {
        self.participants.keys().cloned().collect()
    }

    pub fn is_media_enabled(&self, source: MediaSource) -> bool {
        self.media.is_enabled(source)
    }

    // -----------------------------------------------------------------------
    // Room Events
    // -----------------------------------------------------------------------

    /// Baseline roster after joining. With local media active, we offer to
    /// everyone already present.
    pub async fn on_room_users(&mut self, users: &[PeerInfo]) {
        // A new baseline starts a new room visit.
        self.closed.clear();
        for user in users {
            if !self.is_self(&user.connection_id) {
                self.participants
                    .insert(user.connection_id.clone(), user.user.clone());
            }
        }
        if self.media.is_active() {
            for user in users {
                self.initiate(&user.connection_id).await;
            }
        }
    }

    pub async fn on_user_joined(&mut self, remote: &ConnectionId, user: &UserProfile) {
        if self.is_self(remote) {
            return;
        }
        self.participants.insert(remote.clone(), user.clone());
        if self.media.is_active() {
            self.initiate(remote).await;
        }
    }

    pub async fn on_user_left(&mut self, remote: &ConnectionId) {
        self.participants.remove(remote);
        if self.close_record(remote).await {
            info!(remote = %remote, "Peer left, connection closed");
            self.remember_closed(remote);
        }
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    pub async fn on_signal(&mut self, sender: &ConnectionId, signal: SignalPayload) {
        if self.is_self(sender) {
            debug!("Ignoring signal from self");
            return;
        }
        match signal {
            SignalPayload::Offer { sdp } => self.on_remote_offer(sender, sdp).await,
            SignalPayload::Answer { sdp } => self.on_remote_answer(sender, sdp).await,
            SignalPayload::Candidate(candidate) => self.on_remote_candidate(sender, candidate).await,
        }
    }

    async fn on_remote_offer(&mut self, sender: &ConnectionId, sdp: String) {
        match self.peer_state(sender) {
            PeerState::Negotiating(NegotiationRole::Offerer) => {
                if !self.is_polite_towards(sender) {
                    debug!(remote = %sender, "Offer collision, keeping our offer");
                    return;
                }
                let established = self.peers.get(sender).is_some_and(|r| r.established);
                if established {
                    debug!(remote = %sender, "Offer collision, rolling back our offer");
                    if !self.rollback_offer(sender).await {
                        return;
                    }
                } else {
                    debug!(remote = %sender, "Offer collision, yielding to remote offer");
                    self.close_record(sender).await;
                    if !self.create_record(sender, NegotiationRole::Answerer).await {
                        return;
                    }
                }
            }
            PeerState::Closed | PeerState::NoConnection => {
                if self.closed.contains(sender) {
                    debug!(remote = %sender, "Offer from closed peer, starting fresh");
                }
                if !self.create_record(sender, NegotiationRole::Answerer).await {
                    return;
                }
            }
            PeerState::Negotiating(NegotiationRole::Answerer) | PeerState::Connected => {}
        }
        self.answer_offer(sender, sdp).await;
    }

    async fn on_remote_answer(&mut self, sender: &ConnectionId, sdp: String) {
        let connection = match self.peers.get(sender) {
            Some(record) if record.state == PeerState::Negotiating(NegotiationRole::Offerer) => {
                record.connection.clone()
            }
            _ => {
                warn!(
                    remote = %sender,
                    state = ?self.peer_state(sender),
                    "Unexpected answer, ignoring"
                );
                return;
            }
        };

        if let Err(e) = connection
            .set_remote_description(SessionDescription::answer(sdp))
            .await
        {
            warn!(remote = %sender, error = %e, "Failed to apply answer");
            return;
        }
        self.mark_connected(sender).await;
    }

    async fn on_remote_candidate(&mut self, sender: &ConnectionId, candidate: IceCandidate) {
        if !self.peers.contains_key(sender)
            && !self.create_record(sender, NegotiationRole::Answerer).await
        {
            return;
        }
        let Some(record) = self.peers.get(sender) else {
            return;
        };
        let connection = record.connection.clone();
        if let Err(e) = connection.add_ice_candidate(candidate).await {
            warn!(remote = %sender, error = %e, "Failed to apply ICE candidate");
        }
    }

    // -----------------------------------------------------------------------
    // Native Callbacks
    // -----------------------------------------------------------------------

    pub async fn on_peer_event(&mut self, event: PeerEvent) {
        let remote = event.remote;
        let Some(record) = self.peers.get_mut(&remote) else {
            debug!(remote = %remote, "Event for unknown peer, ignoring");
            return;
        };
        if record.generation != event.generation {
            debug!(remote = %remote, "Event from replaced connection, ignoring");
            return;
        }

        match event.kind {
            PeerEventKind::IceCandidate(candidate) => {
                let _ = self.event_tx.send(MeshEvent::Signal {
                    target: remote,
                    signal: SignalPayload::Candidate(candidate),
                });
            }
            PeerEventKind::TrackAdded {
                stream_id,
                track_id,
            } => {
                let tracks = record.remote_streams.entry(stream_id.clone()).or_default();
                tracks.insert(track_id);
                let stream = RemoteStream {
                    stream_id,
                    track_ids: tracks.iter().cloned().collect(),
                };
                let _ = self.event_tx.send(MeshEvent::StreamAdded { remote, stream });
            }
            PeerEventKind::TrackRemoved {
                stream_id,
                track_id,
            } => {
                let now_empty = match record.remote_streams.get_mut(&stream_id) {
                    Some(tracks) => {
                        tracks.remove(&track_id);
                        tracks.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    record.remote_streams.remove(&stream_id);
                    let _ = self
                        .event_tx
                        .send(MeshEvent::StreamRemoved { remote, stream_id });
                }
            }
            PeerEventKind::StateChanged(state) => {
                match state {
                    ConnectionState::Failed => {
                        warn!(remote = %remote, "Peer connection failed");
                    }
                    ConnectionState::Disconnected => {
                        info!(remote = %remote, "Peer connection interrupted");
                    }
                    _ => debug!(remote = %remote, state = ?state, "Peer connection state"),
                }
                let _ = self
                    .event_tx
                    .send(MeshEvent::ConnectionStateChanged { remote, state });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Local Media
    // -----------------------------------------------------------------------

    /// Turn a capture source on. The first enable acquires the device and
    /// renegotiates with every peer; later ones only unmute.
    pub async fn enable_media(&mut self, source: MediaSource) -> Result<(), MediaError> {
        let was_active = self.media.is_active();

        if let Some(track) = self.media.get(source).cloned() {
            if !track.is_enabled() {
                track.set_enabled(true);
                self.emit(MeshEvent::MediaChanged {
                    source,
                    enabled: true,
                });
                if !was_active {
                    self.connect_known_participants().await;
                }
            }
            return Ok(());
        }

        let track = match self.devices.acquire(source).await {
            Ok(track) => track,
            Err(e) => {
                warn!(source = %source, error = %e, "Media acquisition failed");
                self.emit(MeshEvent::MediaError {
                    source,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        track.set_enabled(true);
        self.media.insert(track.clone());
        info!(
            source = %source,
            track = track.id(),
            stream = track.stream_id(),
            "Local media started"
        );
        self.emit(MeshEvent::MediaChanged {
            source,
            enabled: true,
        });

        self.attach_to_existing_peers(&track).await;
        if !was_active {
            self.connect_known_participants().await;
        }
        Ok(())
    }

    /// Mute a capture source in place.
    pub async fn disable_media(&mut self, source: MediaSource) {
        if let Some(track) = self.media.get(source) {
            if track.is_enabled() {
                track.set_enabled(false);
                self.emit(MeshEvent::MediaChanged {
                    source,
                    enabled: false,
                });
            }
        }
    }

    pub async fn set_media(&mut self, source: MediaSource, enabled: bool) -> Result<(), MediaError> {
        if enabled {
            self.enable_media(source).await
        } else {
            self.disable_media(source).await;
            Ok(())
        }
    }

    /// Flip a source and return its new state.
    pub async fn toggle_media(&mut self, source: MediaSource) -> Result<bool, MediaError> {
        let enable = !self.media.is_enabled(source);
        self.set_media(source, enable).await?;
        Ok(enable)
    }

    /// Close every connection and release every capture device.
    pub async fn shutdown(&mut self) {
        let remotes: Vec<ConnectionId> = self.peers.keys().cloned().collect();
        for remote in &remotes {
            self.close_record(remote).await;
        }
        self.participants.clear();
        self.closed.clear();
        self.media.stop_all();
        info!(peers = remotes.len(), "Peer mesh shut down");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn emit(&self, event: MeshEvent) {
        let _ = self.event_tx.send(event);
    }

    fn is_self(&self, id: &ConnectionId) -> bool {
        self.local_id.as_ref() == Some(id)
    }

    /// The side with the lower connection id yields on offer collision.
    fn is_polite_towards(&self, remote: &ConnectionId) -> bool {
        match &self.local_id {
            Some(local) => local < remote,
            None => true,
        }
    }

    /// Create a connection record with every local track attached.
    async fn create_record(&mut self, remote: &ConnectionId, role: NegotiationRole) -> bool {
        let generation = self.next_generation;
        self.next_generation += 1;
        let events = PeerEventSender::new(remote.clone(), generation, self.peer_event_tx.clone());

        let connection = match self.factory.create(&self.config.ice_servers, events).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Failed to create peer connection");
                return false;
            }
        };

        self.forget_closed(remote);
        let mut record = PeerRecord::new(connection.clone(), generation, PeerState::Negotiating(role));
        for track in self.media.tracks() {
            match connection.add_track(track.clone()).await {
                Ok(()) => {
                    record.attached.insert(track.id().to_string());
                }
                Err(e) => warn!(remote = %remote, track = track.id(), error = %e, "Failed to attach track"),
            }
        }

        self.peers.insert(remote.clone(), record);
        debug!(remote = %remote, role = ?role, generation, "Peer record created");
        true
    }

    /// Start a connection as the offerer, unless one already exists.
    async fn initiate(&mut self, remote: &ConnectionId) {
        if self.is_self(remote) || self.peers.contains_key(remote) {
            return;
        }
        if !self.create_record(remote, NegotiationRole::Offerer).await {
            return;
        }
        if !self.send_offer(remote).await {
            // Drop the half-made record so the next trigger starts over.
            if let Some(record) = self.peers.remove(remote) {
                record.connection.close().await;
            }
        }
    }

    async fn send_offer(&mut self, remote: &ConnectionId) -> bool {
        let Some(record) = self.peers.get(remote) else {
            return false;
        };
        let connection = record.connection.clone();

        let result = async {
            let sdp = connection.create_offer().await?;
            connection
                .set_local_description(SessionDescription::offer(sdp.clone()))
                .await?;
            Ok::<_, PeerError>(sdp)
        }
        .await;

        match result {
            Ok(sdp) => {
                if let Some(record) = self.peers.get_mut(remote) {
                    record.state = PeerState::Negotiating(NegotiationRole::Offerer);
                    record.renegotiate_pending = false;
                }
                debug!(remote = %remote, "Sending offer");
                self.emit(MeshEvent::Signal {
                    target: remote.clone(),
                    signal: SignalPayload::Offer { sdp },
                });
                true
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "Failed to create offer");
                false
            }
        }
    }

    /// Withdraw our pending offer on an established connection so the remote
    /// offer can be answered on it. Our change is offered again afterwards.
    async fn rollback_offer(&mut self, remote: &ConnectionId) -> bool {
        let Some(record) = self.peers.get(remote) else {
            return false;
        };
        let connection = record.connection.clone();
        if let Err(e) = connection
            .set_local_description(SessionDescription::rollback())
            .await
        {
            warn!(remote = %remote, error = %e, "Failed to roll back local offer");
            return false;
        }
        if let Some(record) = self.peers.get_mut(remote) {
            record.state = PeerState::Negotiating(NegotiationRole::Answerer);
            record.renegotiate_pending = true;
        }
        true
    }

    async fn answer_offer(&mut self, remote: &ConnectionId, offer: String) {
        let Some(record) = self.peers.get(remote) else {
            return;
        };
        let connection = record.connection.clone();

        let result = async {
            connection
                .set_remote_description(SessionDescription::offer(offer))
                .await?;
            let sdp = connection.create_answer().await?;
            connection
                .set_local_description(SessionDescription::answer(sdp.clone()))
                .await?;
            Ok::<_, PeerError>(sdp)
        }
        .await;

        match result {
            Ok(sdp) => {
                debug!(remote = %remote, "Sending answer");
                self.emit(MeshEvent::Signal {
                    target: remote.clone(),
                    signal: SignalPayload::Answer { sdp },
                });
                self.mark_connected(remote).await;
            }
            Err(e) => warn!(remote = %remote, error = %e, "Failed to answer offer"),
        }
    }

    /// Settle a negotiation, then issue any renegotiation that queued up.
    async fn mark_connected(&mut self, remote: &ConnectionId) {
        let pending = match self.peers.get_mut(remote) {
            Some(record) => {
                record.state = PeerState::Connected;
                record.established = true;
                record.renegotiate_pending
            }
            None => return,
        };
        info!(remote = %remote, "Peer negotiated");
        if pending {
            debug!(remote = %remote, "Issuing deferred renegotiation");
            self.send_offer(remote).await;
        }
    }

    async fn attach_to_existing_peers(&mut self, track: &Arc<dyn LocalTrack>) {
        let remotes: Vec<ConnectionId> = self.peers.keys().cloned().collect();
        for remote in remotes {
            let Some(record) = self.peers.get(&remote) else {
                continue;
            };
            if record.attached.contains(track.id()) {
                continue;
            }
            let connection = record.connection.clone();
            if let Err(e) = connection.add_track(track.clone()).await {
                warn!(remote = %remote, track = track.id(), error = %e, "Failed to attach track");
                continue;
            }

            let Some(record) = self.peers.get_mut(&remote) else {
                continue;
            };
            record.attached.insert(track.id().to_string());
            if record.is_negotiating() {
                record.renegotiate_pending = true;
                continue;
            }
            if record.state == PeerState::Connected {
                self.send_offer(&remote).await;
            }
        }
    }

    async fn connect_known_participants(&mut self) {
        let pending: Vec<ConnectionId> = self
            .participants
            .keys()
            .filter(|id| !self.peers.contains_key(*id))
            .cloned()
            .collect();
        for remote in pending {
            self.initiate(&remote).await;
        }
    }

    fn remember_closed(&mut self, remote: &ConnectionId) {
        if self.closed.contains(remote) {
            return;
        }
        if self.closed.len() == CLOSED_MEMORY {
            self.closed.pop_front();
        }
        self.closed.push_back(remote.clone());
    }

    fn forget_closed(&mut self, remote: &ConnectionId) -> bool {
        let before = self.closed.len();
        self.closed.retain(|id| id != remote);
        self.closed.len() != before
    }

    /// Remove and close a record, reporting its remote streams as gone.
    async fn close_record(&mut self, remote: &ConnectionId) -> bool {
        let Some(record) = self.peers.remove(remote) else {
            return false;
        };
        record.connection.close().await;
        for stream_id in record.remote_streams.into_keys() {
            self.emit(MeshEvent::StreamRemoved {
                remote: remote.clone(),
                stream_id,
            });
        }
        true
    }
}
