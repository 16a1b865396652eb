//! Desktop audio for Tonearm
//!
//! Platform implementations of the playback engine's collaborators:
//!
//! - [`CpalContext`]: the audio context, a CPAL output stream owned by a
//!   dedicated thread and started on the first resume
//! - [`DecoderTransport`]: the transport device, decoding local files and
//!   HTTP streams with Symphonia and resampling to the output rate with Rubato
//!
//! # Example
//!
//! ```no_run
//! use tonearm_audio_desktop::{CpalContext, DecoderTransport, DesktopConfig};
//! use tonearm_playback::{EngineConfig, PlaybackEngine, Track};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let context = CpalContext::open()?;
//! let transport = DecoderTransport::new(DesktopConfig::default())?;
//! let engine = PlaybackEngine::open(
//!     EngineConfig::default(),
//!     Box::new(context),
//!     Box::new(transport),
//! )?;
//!
//! engine
//!     .load_and_play(Track::from_locator("http://localhost:8765/audio/song.flac"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod decoder;
mod error;
mod locator;
mod transport;

pub use config::{DesktopConfig, ResamplingQuality};
pub use context::CpalContext;
pub use decoder::StreamDecoder;
pub use error::{AudioError, Result};
pub use locator::StreamLocator;
pub use transport::DecoderTransport;
