//! Playback engine
//!
//! Owns the transport device, the audio context and the lazily built signal
//! graph, and runs the playback state machine:
//!
//! ```text
//! Idle -> Loading -> Playing <-> Paused
//! Playing -> Ended -> Idle (track retained)
//! any -> Failed -> Idle (on reset)
//! ```
//!
//! All state lives in one `EngineCore` behind an async mutex. Commands and
//! device events mutate it only while holding the lock, and the lock is never
//! held across an await: deferred outcomes (context resume, device play) are
//! awaited unlocked and applied afterwards only if the command's ticket is
//! still the latest.

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::context::{AudioContext, ContextState};
use crate::device::{Deferred, DeviceEvent, DeviceEventKind, DeviceEvents, TransportDevice};
use crate::error::{PlaybackError, Result};
use crate::events::{PlaybackObserverBridge, PlaybackSubscription};
use crate::graph::{AnalyserHandle, GainControl, SignalGraph};
use crate::types::{FailureReason, OutputFormat, PlaybackPhase, PlaybackState, Track};

/// Playback engine
///
/// Create inside a Tokio runtime with [`PlaybackEngine::open`]. Commands take
/// `&self`, so the engine can be shared behind an `Arc`.
pub struct PlaybackEngine {
    core: Arc<Mutex<EngineCore>>,
    bridge: Arc<PlaybackObserverBridge>,
    analyser: AnalyserHandle,
    pump: JoinHandle<()>,
}

impl PlaybackEngine {
    /// Open the engine over a context and a device
    ///
    /// Takes the device's event channel (once for the engine lifetime) and
    /// spawns the task feeding device events into the engine.
    ///
    /// # Errors
    /// * `Config` - invalid configuration, or no Tokio runtime
    /// * `ReentrancyGuardTriggered` - the device's events were already taken
    pub fn open(
        config: EngineConfig,
        context: Box<dyn AudioContext>,
        mut device: Box<dyn TransportDevice>,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PlaybackError::Config("playback engine must be opened inside a Tokio runtime".into())
        })?;

        let events = device.take_events().ok_or_else(|| {
            PlaybackError::ReentrancyGuardTriggered("device events already subscribed".into())
        })?;

        let state = PlaybackState::new(config.initial_volume);
        let bridge = Arc::new(PlaybackObserverBridge::new(
            state.clone(),
            config.notification_capacity,
        ));
        let gain = GainControl::new(config.initial_volume);
        let analyser = AnalyserHandle::new(&config);

        let core = Arc::new(Mutex::new(EngineCore {
            state,
            device,
            context,
            graph: None,
            gain,
            analyser: analyser.clone(),
            bridge: Arc::clone(&bridge),
            epoch: 0,
            ticket: 0,
            faulted: None,
            closed: false,
            config,
        }));

        let pump = runtime.spawn(pump_device_events(Arc::downgrade(&core), events));

        info!("Playback engine opened");

        Ok(Self {
            core,
            bridge,
            analyser,
            pump,
        })
    }

    /// Load `track` and start playing it
    ///
    /// Resumes without reloading when `track` is the current, paused track;
    /// does nothing when it is already playing or still loading.
    ///
    /// # Errors
    /// * `PolicyDenied` / `SourceUnavailable` - the attempt failed; the
    ///   engine is in `Failed` and accepts a new attempt
    /// * `Superseded` - a newer command took over while this one was pending
    /// * `ReentrancyGuardTriggered` - fatal, the engine must be recreated
    pub async fn load_and_play(&self, track: Track) -> Result<()> {
        let ticket = {
            let mut core = self.core.lock().await;
            core.check_usable()?;
            core.settle_pending_end();

            if core.state.is_current(&track) {
                let phase = core.state.phase.clone();
                match phase {
                    PlaybackPhase::Paused => {
                        debug!(identity = %track.identity_key, "Resuming paused track");
                        core.next_ticket()
                    }
                    PlaybackPhase::Playing => {
                        debug!(identity = %track.identity_key, "Track already playing");
                        return Ok(());
                    }
                    // The pending attempt owns the outcome
                    PlaybackPhase::Loading => {
                        debug!(identity = %track.identity_key, "Track already loading");
                        return Ok(());
                    }
                    _ => core.begin_load(track.clone()),
                }
            } else {
                core.begin_load(track.clone())
            }
        };

        self.start(ticket, &track.identity_key).await
    }

    /// Pause output, keeping the position
    ///
    /// Does nothing unless playing.
    pub async fn pause(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        core.check_usable()?;
        core.settle_pending_end();
        core.pause();
        Ok(())
    }

    /// Pause when playing, otherwise (re)start the current track
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let track = {
            let mut core = self.core.lock().await;
            core.check_usable()?;
            core.settle_pending_end();

            if core.state.is_playing() {
                core.pause();
                return Ok(());
            }
            core.state.current_track.clone()
        };

        match track {
            Some(track) => self.load_and_play(track).await,
            None => ignore(PlaybackError::InvalidCommand(
                "toggle with no track loaded".into(),
            )),
        }
    }

    /// Seek the current track
    ///
    /// Clamped to `[0, duration]` when the duration is known. Ignored while
    /// idle or failed.
    pub async fn seek(&self, target_seconds: f64) -> Result<()> {
        let mut core = self.core.lock().await;
        core.check_usable()?;

        if target_seconds.is_nan() {
            return ignore(PlaybackError::InvalidCommand("seek to NaN".into()));
        }
        if core.state.current_track.is_none() || !core.state.phase.accepts_seek() {
            return ignore(PlaybackError::InvalidCommand(format!(
                "seek while {:?}",
                core.state.phase
            )));
        }

        let position = clamp_seek(target_seconds, core.state.known_duration());
        debug!(target_seconds, position, "Seeking");

        core.state.position_seconds = position;
        core.device.seek(position);
        core.publish();
        Ok(())
    }

    /// Set the output volume, clamped to `[0, 1]`
    ///
    /// Applied to the gain stage immediately, in any phase.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if volume.is_nan() {
            return ignore(PlaybackError::InvalidCommand("volume is NaN".into()));
        }

        let mut core = self.core.lock().await;
        if core.closed {
            return Err(PlaybackError::EngineClosed);
        }

        let applied = core.gain.set(volume);
        core.state.volume = applied;
        core.publish();
        Ok(())
    }

    /// Leave `Failed` or `Ended` for `Idle`, keeping the current track
    pub async fn reset(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        core.check_usable()?;
        core.settle_pending_end();

        if !matches!(
            core.state.phase,
            PlaybackPhase::Failed(_) | PlaybackPhase::Ended
        ) {
            return ignore(PlaybackError::InvalidCommand(format!(
                "reset while {:?}",
                core.state.phase
            )));
        }

        core.next_ticket();
        core.state.phase = PlaybackPhase::Idle;
        core.publish();
        Ok(())
    }

    /// Close the audio context and stop processing device events
    ///
    /// Later commands fail with `EngineClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        let mut context = {
            let mut core = self.core.lock().await;
            if core.closed {
                return Ok(());
            }
            core.close()
        };
        self.pump.abort();

        // Closing joins the platform's audio thread
        let closed = tokio::task::spawn_blocking(move || context.close())
            .await
            .map_err(|e| {
                error!(error = %e, "Audio context close task failed");
                PlaybackError::ContextClosed
            })?;
        info!("Playback engine shut down");
        closed
    }

    /// Current state, by value; never blocks
    pub fn snapshot(&self) -> PlaybackState {
        self.bridge.snapshot()
    }

    /// Push subscription to state changes
    pub fn subscribe(&self) -> PlaybackSubscription {
        self.bridge.subscribe()
    }

    /// Latest-value receiver of the state
    pub fn watch(&self) -> watch::Receiver<PlaybackState> {
        self.bridge.watch()
    }

    /// Spectrum/waveform of the analysis stage
    pub fn analyser(&self) -> &AnalyserHandle {
        &self.analyser
    }

    /// Destination format, once the signal graph has been built
    pub async fn graph_format(&self) -> Option<OutputFormat> {
        self.core.lock().await.graph.as_ref().map(SignalGraph::format)
    }

    /// Resume the context if needed, build the graph, then play
    async fn start(&self, ticket: u64, identity: &str) -> Result<()> {
        let resume = {
            let mut core = self.core.lock().await;
            core.ensure_current(ticket, identity)?;
            match core.resume_context() {
                Ok(resume) => resume,
                Err(err) => return core.fail_start(ticket, identity, err),
            }
        };

        if let Some(resume) = resume {
            if let Err(err) = resume.await {
                return self.core.lock().await.fail_start(ticket, identity, err);
            }
        }

        let play = {
            let mut core = self.core.lock().await;
            core.ensure_current(ticket, identity)?;
            if let Err(err) = core.ensure_graph() {
                return core.fail_start(ticket, identity, err);
            }
            core.device.play()
        };

        let outcome = play.await;
        self.core
            .lock()
            .await
            .complete_start(ticket, identity, outcome)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// State owned by the single writer
struct EngineCore {
    config: EngineConfig,
    state: PlaybackState,
    device: Box<dyn TransportDevice>,
    context: Box<dyn AudioContext>,
    graph: Option<SignalGraph>,
    gain: GainControl,
    analyser: AnalyserHandle,
    bridge: Arc<PlaybackObserverBridge>,
    /// Bind epoch of the current stream (0 = nothing bound yet)
    epoch: u64,
    /// Ticket of the latest command that may complete asynchronously
    ticket: u64,
    faulted: Option<PlaybackError>,
    closed: bool,
}

impl EngineCore {
    fn publish(&self) {
        self.bridge.publish(&self.state);
    }

    fn check_usable(&self) -> Result<()> {
        if self.closed {
            return Err(PlaybackError::EngineClosed);
        }
        match &self.faulted {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn next_ticket(&mut self) -> u64 {
        self.ticket += 1;
        self.ticket
    }

    fn ensure_current(&self, ticket: u64, identity: &str) -> Result<()> {
        self.check_usable()?;

        let same_track = self
            .state
            .current_track
            .as_ref()
            .is_some_and(|track| track.identity_key == identity);

        if ticket == self.ticket && same_track {
            Ok(())
        } else {
            debug!(ticket, latest = self.ticket, identity, "Command superseded");
            Err(PlaybackError::Superseded)
        }
    }

    fn begin_load(&mut self, track: Track) -> u64 {
        let ticket = self.next_ticket();
        info!(
            identity = %track.identity_key,
            locator = %track.stream_locator,
            "Loading track"
        );

        self.state.phase = PlaybackPhase::Loading;
        self.epoch = self.device.bind(&track.stream_locator);
        self.state.current_track = Some(track);
        self.state.position_seconds = 0.0;
        self.state.duration_seconds = 0.0;
        self.publish();

        ticket
    }

    fn resume_context(&mut self) -> Result<Option<Deferred>> {
        match self.context.state() {
            ContextState::Running => Ok(None),
            ContextState::Suspended => {
                debug!("Resuming suspended audio context");
                Ok(Some(self.context.resume()))
            }
            ContextState::Closed => Err(PlaybackError::ContextClosed),
        }
    }

    fn ensure_graph(&mut self) -> Result<()> {
        if self.graph.is_some() {
            return Ok(());
        }

        let graph = SignalGraph::build(
            self.device.as_mut(),
            self.context.as_mut(),
            &self.gain,
            &self.analyser,
            &self.config,
        )?;
        self.graph = Some(graph);
        Ok(())
    }

    fn fail_start(&mut self, ticket: u64, identity: &str, err: PlaybackError) -> Result<()> {
        if err.is_fatal() {
            self.fault(&err);
            return Err(err);
        }

        self.ensure_current(ticket, identity)?;
        warn!(error = %err, identity, "Playback failed to start");
        self.fail(&err);
        Err(err)
    }

    fn complete_start(
        &mut self,
        ticket: u64,
        identity: &str,
        outcome: Result<()>,
    ) -> Result<()> {
        if let Err(err) = outcome {
            return self.fail_start(ticket, identity, err);
        }

        self.ensure_current(ticket, identity)?;

        // The device may have reported an error while play was pending
        if let PlaybackPhase::Failed(reason) = &self.state.phase {
            return Err(PlaybackError::SourceUnavailable(reason.message.clone()));
        }

        if matches!(
            self.state.phase,
            PlaybackPhase::Loading | PlaybackPhase::Paused
        ) {
            info!(identity, "Playback started");
            self.state.phase = PlaybackPhase::Playing;
            self.publish();
            // A very short stream may already be over
            self.settle_pending_end();
        }
        Ok(())
    }

    fn pause(&mut self) {
        if !self.state.is_playing() {
            debug!(phase = ?self.state.phase, "Ignoring pause");
            return;
        }

        self.device.pause();
        self.state.phase = PlaybackPhase::Paused;
        self.publish();
    }

    /// Publish an end-of-stream the device reached but has not delivered yet
    ///
    /// Keeps `Playing -> Ended` visible when a new command arrives in the
    /// same tick as the device's `ended` event.
    fn settle_pending_end(&mut self) {
        if self.state.is_playing() && self.epoch != 0 && self.device.has_ended() {
            self.mark_ended();
        }
    }

    fn mark_ended(&mut self) {
        if let Some(duration) = self.state.known_duration() {
            self.state.position_seconds = duration;
        }
        self.state.phase = PlaybackPhase::Ended;
        self.publish();

        if let Some(track) = self.state.current_track.clone() {
            self.bridge.track_finished(track);
        }
    }

    /// Stop playback and hand out the context for closing
    fn close(&mut self) -> Box<dyn AudioContext> {
        self.closed = true;
        self.next_ticket();
        if self.state.is_playing() {
            self.device.pause();
        }
        if matches!(
            self.state.phase,
            PlaybackPhase::Playing | PlaybackPhase::Loading
        ) {
            self.state.phase = PlaybackPhase::Paused;
            self.publish();
        }

        let format = self.context.format();
        std::mem::replace(&mut self.context, Box::new(ReleasedContext { format }))
    }

    fn fail(&mut self, err: &PlaybackError) {
        self.state.phase = PlaybackPhase::Failed(FailureReason::from(err));
        self.publish();
    }

    fn fault(&mut self, err: &PlaybackError) {
        error!(error = %err, "Playback engine faulted");
        self.faulted = Some(err.clone());
        self.next_ticket();
        self.fail(err);
    }

    fn apply_device_event(&mut self, event: DeviceEvent) {
        if self.closed {
            return;
        }
        if event.epoch != self.epoch {
            debug!(
                epoch = event.epoch,
                current = self.epoch,
                "Dropping event from replaced stream"
            );
            return;
        }

        match event.kind {
            DeviceEventKind::PositionTick(seconds) => {
                let active = matches!(
                    self.state.phase,
                    PlaybackPhase::Loading | PlaybackPhase::Playing | PlaybackPhase::Paused
                );
                if !active || seconds.is_nan() {
                    return;
                }
                let mut position = seconds.max(0.0);
                if let Some(duration) = self.state.known_duration() {
                    position = position.min(duration);
                }
                self.state.position_seconds = position;
                self.publish();
            }
            DeviceEventKind::DurationKnown(seconds) => {
                if seconds.is_finite() && seconds > 0.0 {
                    debug!(duration = seconds, "Duration known");
                    self.state.duration_seconds = seconds;
                    self.publish();
                }
            }
            DeviceEventKind::Ended => {
                if self.state.is_playing() {
                    self.mark_ended();
                }
            }
            DeviceEventKind::Error(err) => {
                let active = matches!(
                    self.state.phase,
                    PlaybackPhase::Loading | PlaybackPhase::Playing | PlaybackPhase::Paused
                );
                if active {
                    warn!(error = %err, "Device reported playback error");
                    self.fail(&err);
                }
            }
        }
    }
}

/// Stands in for the context once shutdown has taken it
struct ReleasedContext {
    format: OutputFormat,
}

impl AudioContext for ReleasedContext {
    fn state(&self) -> ContextState {
        ContextState::Closed
    }

    fn format(&self) -> OutputFormat {
        self.format
    }

    fn resume(&mut self) -> Deferred {
        Box::pin(async { Err(PlaybackError::ContextClosed) })
    }

    fn connect(&mut self, _renderer: crate::graph::GraphRenderer) -> Result<()> {
        Err(PlaybackError::ContextClosed)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Feed device events into the engine, one at a time
async fn pump_device_events(core: Weak<Mutex<EngineCore>>, mut events: DeviceEvents) {
    while let Some(event) = events.recv().await {
        let Some(core) = core.upgrade() else {
            break;
        };
        core.lock().await.apply_device_event(event);
    }
    debug!("Device event pump stopped");
}

/// Clamp a seek target: never negative, never past a known duration
fn clamp_seek(target_seconds: f64, duration: Option<f64>) -> f64 {
    let position = target_seconds.max(0.0);
    match duration {
        Some(duration) => position.min(duration),
        None => position,
    }
}

/// Swallow a command that does not apply to the current state
fn ignore(err: PlaybackError) -> Result<()> {
    debug!(error = %err, "Ignoring transport command");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_clamped_to_known_duration() {
        assert_eq!(clamp_seek(200.0, Some(180.0)), 180.0);
        assert_eq!(clamp_seek(-5.0, Some(180.0)), 0.0);
        assert_eq!(clamp_seek(42.5, Some(180.0)), 42.5);
    }

    #[test]
    fn seek_unbounded_above_when_duration_unknown() {
        assert_eq!(clamp_seek(1_000.0, None), 1_000.0);
        assert_eq!(clamp_seek(-1.0, None), 0.0);
        assert_eq!(clamp_seek(f64::INFINITY, Some(10.0)), 10.0);
    }

    #[test]
    fn ignore_swallows_invalid_commands() {
        assert!(ignore(PlaybackError::InvalidCommand("x".into())).is_ok());
    }
}
