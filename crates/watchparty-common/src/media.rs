use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three independently toggled local capture sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaSource {
    WebcamAudio,
    WebcamVideo,
    Screen,
}

impl MediaSource {
    pub const ALL: [MediaSource; 3] = [
        MediaSource::WebcamAudio,
        MediaSource::WebcamVideo,
        MediaSource::Screen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::WebcamAudio => "webcam-audio",
            MediaSource::WebcamVideo => "webcam-video",
            MediaSource::Screen => "screen",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
