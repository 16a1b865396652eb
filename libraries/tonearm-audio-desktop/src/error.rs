/// Desktop audio errors
use thiserror::Error;
use tonearm_playback::PlaybackError;

/// Result type for desktop audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Desktop audio errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// No output device
    #[error("Audio device not found")]
    DeviceNotFound,

    /// Device error
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Failed to build output stream
    #[error("Failed to build output stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the output stream
    #[error("Failed to play stream: {0}")]
    PlayError(String),

    /// Audio thread is gone
    #[error("Audio thread stopped")]
    ThreadStopped,

    /// Locator is neither a path nor a supported URL
    #[error("Invalid stream locator: {0}")]
    InvalidLocator(String),

    /// File could not be opened
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP fetch failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Container or codec not supported
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Packet read or decode failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Sample rate conversion error
    #[error("Sample rate conversion error: {0}")]
    ResampleError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AudioError {
    /// Whether the error comes from the output device rather than the stream
    pub fn is_output_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound
                | Self::DeviceError(_)
                | Self::StreamBuildError(_)
                | Self::PlayError(_)
        )
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::StreamBuildError(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AudioError::PlayError(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::DeviceError(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match err {
            SymphoniaError::Unsupported(what) => AudioError::UnsupportedFormat(what.to_string()),
            SymphoniaError::IoError(io) => AudioError::Io(io),
            other => AudioError::Decode(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AudioError {
    fn from(err: reqwest::Error) -> Self {
        AudioError::Http(err.to_string())
    }
}

/// The output refusing to start is the desktop form of a blocked resume;
/// everything else means the stream itself is unusable.
impl From<AudioError> for PlaybackError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::ThreadStopped => PlaybackError::ContextClosed,
            AudioError::Config(message) => PlaybackError::Config(message),
            err if err.is_output_error() => PlaybackError::PolicyDenied(err.to_string()),
            err => PlaybackError::SourceUnavailable(err.to_string()),
        }
    }
}
