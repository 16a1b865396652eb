//! Signal graph
//!
//! Fixed topology: `device output -> gain -> analysis -> destination`.
//! The graph is wired once; switching tracks only rebinds the device source.

mod analysis;
mod gain;

pub use analysis::{AnalyserHandle, AnalysisFrame, AnalysisStage};
pub use gain::{GainControl, GainStage};

use tracing::info;

use crate::config::EngineConfig;
use crate::context::AudioContext;
use crate::device::{OutputTap, TransportDevice};
use crate::error::Result;
use crate::types::OutputFormat;

/// Compiled graph, run by the context on its render thread
pub struct GraphRenderer {
    tap: Box<dyn OutputTap>,
    gain: GainStage,
    analysis: AnalysisStage,
}

impl GraphRenderer {
    /// Assemble the render chain
    pub fn new(tap: Box<dyn OutputTap>, gain: GainStage, analysis: AnalysisStage) -> Self {
        Self {
            tap,
            gain,
            analysis,
        }
    }

    /// Render one destination buffer of interleaved samples
    ///
    /// # Real-Time Safety
    /// - No allocations
    /// - No blocking operations
    pub fn render(&mut self, buffer: &mut [f32], channels: usize) {
        let written = self.tap.fill(buffer, channels).min(buffer.len());
        buffer[written..].fill(0.0);

        self.gain.process(buffer, channels);
        self.analysis.process(buffer, channels);
    }
}

/// Wired signal graph
///
/// Existence of a value means the device output has been bound to the
/// destination; there is no way to unwire it.
#[derive(Debug)]
pub struct SignalGraph {
    format: OutputFormat,
}

impl SignalGraph {
    /// Bind the device output and install the render chain into the context
    ///
    /// # Errors
    /// * `ReentrancyGuardTriggered` - the device output was already bound
    /// * `ContextClosed` - the context can no longer render
    pub fn build(
        device: &mut dyn TransportDevice,
        context: &mut dyn AudioContext,
        gain: &GainControl,
        analyser: &AnalyserHandle,
        config: &EngineConfig,
    ) -> Result<Self> {
        let format = context.format();
        let tap = device.connect_output(format)?;

        let renderer = GraphRenderer::new(
            tap,
            GainStage::new(gain.clone()),
            AnalysisStage::new(analyser, config),
        );
        context.connect(renderer)?;

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Signal graph connected"
        );

        Ok(Self { format })
    }

    /// Destination format the graph renders into
    pub fn format(&self) -> OutputFormat {
        self.format
    }
}
