//! Error types for the playback engine

use thiserror::Error;

/// Playback errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Resume or play was blocked by the platform autoplay policy
    #[error("Playback denied by policy: {0}")]
    PolicyDenied(String),

    /// The stream could not be fetched or decoded
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Command does not apply to the current state
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The device output was bound to the graph a second time
    #[error("Reentrancy guard triggered: {0}")]
    ReentrancyGuardTriggered(String),

    /// A newer command took over before this one completed
    #[error("Superseded by a newer command")]
    Superseded,

    /// The audio context was closed
    #[error("Audio context closed")]
    ContextClosed,

    /// The engine was shut down
    #[error("Playback engine closed")]
    EngineClosed,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Whether this error leaves the engine unusable until restarted
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReentrancyGuardTriggered(_))
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
