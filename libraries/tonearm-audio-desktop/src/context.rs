//! CPAL-backed audio context
//!
//! **Architecture**: a dedicated audio thread owns the CPAL `Stream` (which
//! is not `Send` on every platform). The engine side talks to it over a
//! crossbeam channel; resume outcomes come back over a oneshot.
//!
//! The stream is built on the first resume, so a freshly opened context is
//! `Suspended` and produces nothing. The output callback renders the installed
//! graph through a `try_lock`, falling back to silence, so it never waits on
//! the control side.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use tokio::sync::oneshot;
use tonearm_playback::{
    AudioContext, ContextState, Deferred, GraphRenderer, OutputFormat, PlaybackError,
};
use tracing::{debug, error, info, warn};

use crate::error::{AudioError, Result};

/// Commands sent to the audio thread
enum ContextCommand {
    /// Build the stream if needed and start it
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Drop the stream and exit
    Close,
}

/// Slot the output callback renders from
type RendererSlot = Arc<Mutex<Option<GraphRenderer>>>;

/// Desktop audio context on the default output device
pub struct CpalContext {
    command_tx: Sender<ContextCommand>,
    format: OutputFormat,
    state: Arc<Mutex<ContextState>>,
    renderer: RendererSlot,
    audio_thread: Option<JoinHandle<()>>,
}

impl CpalContext {
    /// Open a context on the default output device
    ///
    /// # Errors
    /// Returns an error if no audio device is found or it reports no usable
    /// output configuration
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::DeviceNotFound)?;

        let supported = device.default_output_config()?;
        let format = OutputFormat {
            sample_rate: supported.sample_rate(),
            channels: supported.channels(),
        };

        Ok(Self::with_device_and_config(device, supported.config(), format))
    }

    fn with_device_and_config(device: Device, config: StreamConfig, format: OutputFormat) -> Self {
        let state = Arc::new(Mutex::new(ContextState::Suspended));
        let renderer: RendererSlot = Arc::new(Mutex::new(None));
        let (command_tx, command_rx) = bounded::<ContextCommand>(32);

        let thread_state = Arc::clone(&state);
        let thread_renderer = Arc::clone(&renderer);
        let audio_thread = thread::Builder::new()
            .name("tonearm-audio".into())
            .spawn(move || {
                audio_thread_run(device, config, thread_state, thread_renderer, command_rx);
            })
            .map_err(|e| error!(error = %e, "Failed to spawn audio thread"))
            .ok();

        if audio_thread.is_none() {
            set_state(&state, ContextState::Closed);
        }

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Audio context opened"
        );

        Self {
            command_tx,
            format,
            state,
            renderer,
            audio_thread,
        }
    }
}

impl AudioContext for CpalContext {
    fn state(&self) -> ContextState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn format(&self) -> OutputFormat {
        self.format
    }

    fn resume(&mut self) -> Deferred {
        if self.state() == ContextState::Closed {
            return Box::pin(async { Err(PlaybackError::ContextClosed) });
        }

        let (reply, outcome) = oneshot::channel();
        if self
            .command_tx
            .send(ContextCommand::Resume { reply })
            .is_err()
        {
            return Box::pin(async { Err(AudioError::ThreadStopped.into()) });
        }

        Box::pin(async move {
            match outcome.await {
                Ok(result) => result.map_err(PlaybackError::from),
                Err(_) => Err(AudioError::ThreadStopped.into()),
            }
        })
    }

    fn connect(&mut self, renderer: GraphRenderer) -> tonearm_playback::Result<()> {
        if self.state() == ContextState::Closed {
            return Err(PlaybackError::ContextClosed);
        }

        let mut slot = self.renderer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(PlaybackError::ReentrancyGuardTriggered(
                "a graph is already connected to the destination".into(),
            ));
        }
        *slot = Some(renderer);
        debug!("Graph connected to destination");
        Ok(())
    }

    fn close(&mut self) -> tonearm_playback::Result<()> {
        if self.state() == ContextState::Closed && self.audio_thread.is_none() {
            return Ok(());
        }

        // The thread may already be gone; closing is idempotent
        self.command_tx.send(ContextCommand::Close).ok();
        if let Some(handle) = self.audio_thread.take() {
            if handle.join().is_err() {
                warn!("Audio thread panicked");
            }
        }

        set_state(&self.state, ContextState::Closed);
        info!("Audio context closed");
        Ok(())
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        self.close().ok();
    }
}

fn set_state(state: &Mutex<ContextState>, value: ContextState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Audio thread main loop
///
/// Owns the CPAL stream and processes commands until `Close`.
fn audio_thread_run(
    device: Device,
    config: StreamConfig,
    state: Arc<Mutex<ContextState>>,
    renderer: RendererSlot,
    command_rx: Receiver<ContextCommand>,
) {
    let mut stream: Option<Stream> = None;

    while let Ok(command) = command_rx.recv() {
        match command {
            ContextCommand::Resume { reply } => {
                let outcome = start_stream(&device, &config, &renderer, &mut stream);
                match &outcome {
                    Ok(()) => set_state(&state, ContextState::Running),
                    Err(e) => warn!(error = %e, "Audio context resume failed"),
                }
                // The caller may have given up waiting
                reply.send(outcome).ok();
            }
            ContextCommand::Close => break,
        }
    }

    drop(stream.take());
    set_state(&state, ContextState::Closed);
    debug!("Audio thread stopped");
}

fn start_stream(
    device: &Device,
    config: &StreamConfig,
    renderer: &RendererSlot,
    stream: &mut Option<Stream>,
) -> Result<()> {
    if stream.is_none() {
        let channels = usize::from(config.channels);
        let callback_renderer = Arc::clone(renderer);

        let built = device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_callback(data, channels, &callback_renderer);
            },
            |err| error!(error = %err, "Audio stream error"),
            None,
        )?;
        *stream = Some(built);
    }

    match stream {
        Some(s) => s.play().map_err(AudioError::from),
        None => Err(AudioError::StreamBuildError("stream missing after build".into())),
    }
}

/// Output callback (runs in the real-time audio thread)
fn render_callback(data: &mut [f32], channels: usize, renderer: &RendererSlot) {
    if let Ok(mut slot) = renderer.try_lock() {
        if let Some(renderer) = slot.as_mut() {
            renderer.render(data, channels);
            return;
        }
    }
    data.fill(0.0);
}
