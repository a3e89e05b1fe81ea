//! In-memory peer connections and capture devices for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use watchparty_common::{ConnectionId, IceCandidate, MediaError, MediaSource, PeerError};

use super::media::{LocalTrack, MediaDevices};
use super::peer::{
    PeerConnection, PeerConnectionFactory, PeerEventKind, PeerEventSender, SdpKind,
    SessionDescription,
};

// ---------------------------------------------------------------------------
// Peer Connections
// ---------------------------------------------------------------------------

pub(crate) struct FakePeer {
    events: PeerEventSender,
    calls: Mutex<Vec<String>>,
    tracks: Mutex<Vec<String>>,
    candidates: Mutex<Vec<IceCandidate>>,
    offers: AtomicUsize,
    answers: AtomicUsize,
    closed: AtomicBool,
    fail_remote: AtomicBool,
}

impl FakePeer {
    fn new(events: PeerEventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            offers: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            fail_remote: AtomicBool::new(false),
        }
    }

    /// Fire a native callback as the real stack would.
    pub(crate) fn emit(&self, kind: PeerEventKind) {
        self.events.send(kind);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn track_count(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub(crate) fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_remote_descriptions(&self) {
        self.fail_remote.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn describe(desc: &SessionDescription) -> String {
    let kind = match desc.kind {
        SdpKind::Offer => "offer",
        SdpKind::Answer => "answer",
        SdpKind::Rollback => "rollback",
    };
    format!("{kind}:{}", desc.sdp)
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), PeerError> {
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, PeerError> {
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        self.record("create-offer".into());
        Ok(format!("offer-{n}"))
    }

    async fn create_answer(&self) -> Result<String, PeerError> {
        let n = self.answers.fetch_add(1, Ordering::SeqCst);
        self.record("create-answer".into());
        Ok(format!("answer-{n}"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(format!("local:{}", describe(&desc)));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(PeerError::Negotiation("remote description rejected".into()));
        }
        self.record(format!("remote:{}", describe(&desc)));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    peers: Mutex<Vec<(ConnectionId, Arc<FakePeer>)>>,
}

impl FakeFactory {
    pub(crate) fn created_for(&self, remote: &ConnectionId) -> usize {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == remote)
            .count()
    }

    pub(crate) fn latest(&self, remote: &ConnectionId) -> Arc<FakePeer> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == remote)
            .map(|(_, peer)| peer.clone())
            .expect("no connection created for remote")
    }
}

#[async_trait]
impl PeerConnectionFactory for FakeFactory {
    async fn create(
        &self,
        _ice_servers: &[String],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let remote = events.remote().clone();
        let peer = Arc::new(FakePeer::new(events));
        self.peers.lock().unwrap().push((remote, peer.clone()));
        let connection: Arc<dyn PeerConnection> = peer;
        Ok(connection)
    }
}

// ---------------------------------------------------------------------------
// Capture Devices
// ---------------------------------------------------------------------------

pub(crate) struct FakeTrack {
    id: String,
    source: MediaSource,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stream_id(&self) -> &str {
        "local"
    }

    fn source(&self) -> MediaSource {
        self.source
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeDevices {
    denied: Mutex<HashSet<MediaSource>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeDevices {
    pub(crate) fn deny(&self, source: MediaSource) {
        self.denied.lock().unwrap().insert(source);
    }

    pub(crate) fn acquired(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub(crate) fn all_stopped(&self) -> bool {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .all(|t| t.stopped.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self, source: MediaSource) -> Result<Arc<dyn LocalTrack>, MediaError> {
        if self.denied.lock().unwrap().contains(&source) {
            return Err(MediaError::PermissionDenied(source));
        }
        let track = Arc::new(FakeTrack {
            id: format!("{source}-track"),
            source,
            enabled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        self.tracks.lock().unwrap().push(track.clone());
        let track: Arc<dyn LocalTrack> = track;
        Ok(track)
    }
}
