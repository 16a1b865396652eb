//! Core types for the playback engine

use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;

/// A playable audio stream
///
/// Supplied by the library/catalog. Only `identity_key` decides whether two
/// values refer to the same stream; the display fields are carried along for
/// observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Byte source: a local path, a `file://` URL or an `http(s)://` URL
    pub stream_locator: String,

    /// Stable identity, unchanged across reloads of the same file
    pub identity_key: String,

    /// Track title
    #[serde(default)]
    pub title: Option<String>,

    /// Artist name
    #[serde(default)]
    pub artist: Option<String>,

    /// Album name
    #[serde(default)]
    pub album: Option<String>,
}

impl Track {
    /// Create a track without display metadata
    pub fn new(stream_locator: impl Into<String>, identity_key: impl Into<String>) -> Self {
        Self {
            stream_locator: stream_locator.into(),
            identity_key: identity_key.into(),
            title: None,
            artist: None,
            album: None,
        }
    }

    /// Use the locator itself as the identity
    ///
    /// Matches the host's behaviour of keying tracks by file path.
    pub fn from_locator(stream_locator: impl Into<String>) -> Self {
        let locator = stream_locator.into();
        Self::new(locator.clone(), locator)
    }

    /// Attach a title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach an artist
    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    /// Attach an album
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Whether both values refer to the same underlying stream
    pub fn same_stream(&self, other: &Track) -> bool {
        self.identity_key == other.identity_key
    }
}

/// Category of a playback failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Blocked by the autoplay/resume policy
    PolicyDenied,

    /// Network or decode failure
    SourceUnavailable,

    /// Core invariant violated; the engine must be restarted
    Fault,
}

/// Why the engine entered the `Failed` phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Failure category
    pub kind: FailureKind,

    /// Human readable detail
    pub message: String,
}

impl From<&PlaybackError> for FailureReason {
    fn from(err: &PlaybackError) -> Self {
        let kind = match err {
            PlaybackError::PolicyDenied(_) => FailureKind::PolicyDenied,
            PlaybackError::ReentrancyGuardTriggered(_) => FailureKind::Fault,
            _ => FailureKind::SourceUnavailable,
        };

        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Playback phase
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackPhase {
    /// Nothing playing (a track may still be retained)
    #[default]
    Idle,

    /// Binding the stream and starting output
    Loading,

    /// Audio is being produced
    Playing,

    /// Paused mid-track
    Paused,

    /// Reached the end of the track
    Ended,

    /// Last attempt failed
    Failed(FailureReason),
}

impl PlaybackPhase {
    /// Whether a seek makes sense in this phase
    pub fn accepts_seek(&self) -> bool {
        !matches!(self, Self::Idle | Self::Failed(_))
    }
}

/// Snapshot of the engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Track currently bound to the device
    pub current_track: Option<Track>,

    /// Current phase
    pub phase: PlaybackPhase,

    /// Position in seconds (>= 0)
    pub position_seconds: f64,

    /// Duration in seconds (0 = unknown)
    pub duration_seconds: f64,

    /// Output volume in [0.0, 1.0]
    pub volume: f32,
}

impl PlaybackState {
    /// Initial state: idle, no track
    pub fn new(volume: f32) -> Self {
        Self {
            current_track: None,
            phase: PlaybackPhase::Idle,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Whether audio is currently being produced
    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    /// Whether `track` is the one currently bound
    pub fn is_current(&self, track: &Track) -> bool {
        self.current_track
            .as_ref()
            .is_some_and(|current| current.same_stream(track))
    }

    /// Duration, if the device has reported one
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration_seconds > 0.0).then_some(self.duration_seconds)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Output stream format negotiated by the audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}
