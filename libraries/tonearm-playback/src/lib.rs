//! Tonearm - Playback Engine
//!
//! Platform-agnostic playback core for Tonearm.
//!
//! This crate provides:
//! - The playback state machine (load, play, pause, toggle, seek, volume)
//! - A signal graph wired once: device output -> gain -> analysis -> destination
//! - Spectrum/waveform analysis for visualizers
//! - Push and latest-value observation of the playback state
//!
//! # Architecture
//!
//! `tonearm-playback` is platform-agnostic:
//! - No dependency on CPAL (audio output)
//! - No dependency on Symphonia (decoding)
//!
//! Platform code provides an [`AudioContext`] (the output and its render
//! thread) and a [`TransportDevice`] (decode, position, buffering). The engine
//! owns both exclusively.
//!
//! # Example
//!
//! ```rust,no_run
//! use tonearm_playback::{AudioContext, EngineConfig, PlaybackEngine, Track, TransportDevice};
//!
//! # async fn run(
//! #     context: Box<dyn AudioContext>,
//! #     device: Box<dyn TransportDevice>,
//! # ) -> tonearm_playback::Result<()> {
//! let engine = PlaybackEngine::open(EngineConfig::default(), context, device)?;
//! let mut updates = engine.subscribe();
//!
//! engine.load_and_play(Track::from_locator("/music/song.flac")).await?;
//! engine.set_volume(0.5).await?;
//! engine.seek(30.0).await?;
//! engine.toggle_play_pause().await?;
//!
//! while let Some(update) = updates.recv().await {
//!     println!("{:?}", update);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod device;
mod engine;
mod error;
mod events;
pub mod graph;
mod types;

// Public exports
pub use config::EngineConfig;
pub use context::{AudioContext, ContextState};
pub use device::{Deferred, DeviceEvent, DeviceEventKind, DeviceEvents, OutputTap, TransportDevice};
pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result};
pub use events::{PlaybackNotification, PlaybackObserverBridge, PlaybackSubscription};
pub use graph::{AnalyserHandle, AnalysisFrame, GraphRenderer, SignalGraph};
pub use types::{FailureKind, FailureReason, OutputFormat, PlaybackPhase, PlaybackState, Track};
