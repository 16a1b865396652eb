//! Audio context abstraction
//!
//! The context owns the platform output and its realtime render thread. It
//! starts suspended and must be resumed before it produces sound.

use serde::{Deserialize, Serialize};

use crate::device::Deferred;
use crate::error::Result;
use crate::graph::GraphRenderer;
use crate::types::OutputFormat;

/// Lifecycle state of an audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    /// Opened but not producing output
    Suspended,

    /// Rendering
    Running,

    /// Released; cannot be resumed
    Closed,
}

/// Engine-owned output context
pub trait AudioContext: Send {
    /// Current lifecycle state
    fn state(&self) -> ContextState;

    /// Output format of the destination
    fn format(&self) -> OutputFormat;

    /// Ask the platform to start output
    ///
    /// Fails with `PolicyDenied` when the platform refuses, `ContextClosed`
    /// after [`close`](Self::close).
    fn resume(&mut self) -> Deferred;

    /// Install the compiled graph as the destination's render callback
    ///
    /// Called once per context lifetime.
    fn connect(&mut self, renderer: GraphRenderer) -> Result<()>;

    /// Stop output and release the platform stream
    fn close(&mut self) -> Result<()>;
}
