//! Local capture: device seam and the tracks currently held.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use watchparty_common::{MediaError, MediaSource};

/// A captured local track (microphone, camera or screen).
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn stream_id(&self) -> &str;
    fn source(&self) -> MediaSource;
    /// Mute or unmute in place. Never requires renegotiation.
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Release the capture device.
    fn stop(&self);
}

/// Capture devices of the local machine.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, source: MediaSource) -> Result<Arc<dyn LocalTrack>, MediaError>;
}

/// Tracks acquired so far, at most one per source.
#[derive(Default)]
pub struct LocalMedia {
    tracks: BTreeMap<MediaSource, Arc<dyn LocalTrack>>,
}

impl LocalMedia {
    pub fn get(&self, source: MediaSource) -> Option<&Arc<dyn LocalTrack>> {
        self.tracks.get(&source)
    }

    pub fn insert(&mut self, track: Arc<dyn LocalTrack>) {
        self.tracks.insert(track.source(), track);
    }

    /// Whether any acquired track is currently sending.
    pub fn is_active(&self) -> bool {
        self.tracks.values().any(|t| t.is_enabled())
    }

    pub fn is_enabled(&self, source: MediaSource) -> bool {
        self.tracks.get(&source).is_some_and(|t| t.is_enabled())
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Arc<dyn LocalTrack>> {
        self.tracks.values()
    }

    /// Stop and forget every track.
    pub fn stop_all(&mut self) {
        for track in self.tracks.values() {
            track.stop();
        }
        self.tracks.clear();
    }
}
