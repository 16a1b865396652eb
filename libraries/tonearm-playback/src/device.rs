//! Platform-agnostic transport device trait
//!
//! Abstracts the decodable media element for different platforms. The desktop
//! implementation decodes with Symphonia; tests use scripted mocks.

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::OutputFormat;

/// Deferred outcome of an operation that may need an unbounded time to settle
///
/// `'static` so the engine can await it without holding its state lock.
pub type Deferred = BoxFuture<'static, Result<()>>;

/// Receiving end of a device's event channel
pub type DeviceEvents = mpsc::UnboundedReceiver<DeviceEvent>;

/// Event emitted by a transport device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    /// Bind epoch of the stream that produced this event
    pub epoch: u64,

    /// What happened
    pub kind: DeviceEventKind,
}

impl DeviceEvent {
    /// Create an event for the given bind epoch
    pub fn new(epoch: u64, kind: DeviceEventKind) -> Self {
        Self { epoch, kind }
    }
}

/// Event classes a transport device reports
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEventKind {
    /// Periodic playback position (seconds)
    PositionTick(f64),

    /// The stream's duration became known (seconds)
    DurationKnown(f64),

    /// The stream played to its end
    Ended,

    /// Network or decode failure while playing
    Error(crate::error::PlaybackError),
}

/// Pull side of the device output, consumed by the signal graph
///
/// Runs on the context's realtime thread: implementations must not block.
pub trait OutputTap: Send {
    /// Fill `buffer` with interleaved samples for `channels` channels
    ///
    /// Returns the number of samples written; the caller silences the rest.
    fn fill(&mut self, buffer: &mut [f32], channels: usize) -> usize;
}

/// Decodable/playable element owned by the engine
///
/// Exactly one instance exists per engine. Implementors own position,
/// buffering and decode.
pub trait TransportDevice: Send {
    /// Hand out the event channel
    ///
    /// # Returns
    /// * `Some(events)` - on the first call
    /// * `None` - the events were already taken
    fn take_events(&mut self) -> Option<DeviceEvents>;

    /// Replace the source and reset position to zero
    ///
    /// Returns the new bind epoch. Events stamped with an older epoch belong
    /// to a replaced stream.
    fn bind(&mut self, stream_locator: &str) -> u64;

    /// Start or resume playback of the bound stream
    ///
    /// The returned future resolves once audio is flowing, or fails with
    /// `PolicyDenied` or `SourceUnavailable`.
    fn play(&mut self) -> Deferred;

    /// Pause playback (always succeeds while playing)
    fn pause(&mut self);

    /// Seek the bound stream; the device clamps to its own bounds
    fn seek(&mut self, position_seconds: f64);

    /// Current playback position in seconds
    fn position(&self) -> f64;

    /// Whether the bound stream has reached its end
    fn has_ended(&self) -> bool;

    /// Hand the device output to the signal graph
    ///
    /// # Errors
    /// `ReentrancyGuardTriggered` when the output was already connected.
    fn connect_output(&mut self, format: OutputFormat) -> Result<Box<dyn OutputTap>>;
}
