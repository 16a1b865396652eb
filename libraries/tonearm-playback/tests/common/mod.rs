//! Scripted context and device shared by the engine tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tonearm_playback::{
    AudioContext, ContextState, Deferred, DeviceEvent, DeviceEventKind, DeviceEvents,
    EngineConfig, GraphRenderer, OutputFormat, OutputTap, PlaybackEngine, PlaybackError,
    PlaybackNotification, PlaybackPhase, PlaybackState, PlaybackSubscription, Result,
    TransportDevice,
};

// ===== Context =====

#[derive(Default)]
pub struct ContextLog {
    pub state: Option<ContextState>,
    pub resume_calls: usize,
    pub connect_calls: usize,
    pub close_calls: usize,
    pub deny_resumes: usize,
    pub renderer: Option<GraphRenderer>,
    pub close_started: bool,
    pub close_gate: Option<std::sync::mpsc::Receiver<()>>,
}

pub struct MockContext {
    log: Arc<Mutex<ContextLog>>,
}

impl AudioContext for MockContext {
    fn state(&self) -> ContextState {
        self.log.lock().unwrap().state.unwrap_or(ContextState::Suspended)
    }

    fn format(&self) -> OutputFormat {
        OutputFormat {
            sample_rate: 48_000,
            channels: 2,
        }
    }

    fn resume(&mut self) -> Deferred {
        let log = Arc::clone(&self.log);
        Box::pin(async move {
            let mut log = log.lock().unwrap();
            log.resume_calls += 1;
            if log.deny_resumes > 0 {
                log.deny_resumes -= 1;
                return Err(PlaybackError::PolicyDenied("no user gesture".into()));
            }
            log.state = Some(ContextState::Running);
            Ok(())
        })
    }

    fn connect(&mut self, renderer: GraphRenderer) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.connect_calls += 1;
        log.renderer = Some(renderer);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let gate = {
            let mut log = self.log.lock().unwrap();
            log.close_started = true;
            log.close_gate.take()
        };
        // Blocks like joining a real audio thread
        if let Some(gate) = gate {
            gate.recv().ok();
        }

        let mut log = self.log.lock().unwrap();
        log.close_calls += 1;
        log.state = Some(ContextState::Closed);
        Ok(())
    }
}

#[derive(Clone)]
pub struct ContextProbe {
    pub log: Arc<Mutex<ContextLog>>,
}

impl ContextProbe {
    pub fn resume_calls(&self) -> usize {
        self.log.lock().unwrap().resume_calls
    }

    pub fn connect_calls(&self) -> usize {
        self.log.lock().unwrap().connect_calls
    }

    pub fn close_calls(&self) -> usize {
        self.log.lock().unwrap().close_calls
    }

    pub fn close_started(&self) -> bool {
        self.log.lock().unwrap().close_started
    }

    /// Make the next close block until the returned sender fires
    pub fn hold_close(&self) -> std::sync::mpsc::Sender<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.log.lock().unwrap().close_gate = Some(rx);
        tx
    }

    pub fn deny_next_resume(&self) {
        self.log.lock().unwrap().deny_resumes += 1;
    }

    /// Run the installed render chain once, like the output thread would
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        let mut log = self.log.lock().unwrap();
        let renderer = log.renderer.as_mut().expect("graph not connected");
        renderer.render(&mut buffer, 2);
        buffer
    }
}

// ===== Device =====

#[derive(Default)]
pub struct DeviceLog {
    pub binds: Vec<String>,
    pub epoch: u64,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub seeks: Vec<f64>,
    pub connect_calls: usize,
    pub ended: bool,
    pub position: f64,
    pub play_failures: VecDeque<PlaybackError>,
    pub play_gates: VecDeque<oneshot::Receiver<Result<()>>>,
    pub refuse_output: bool,
}

pub struct MockDevice {
    log: Arc<Mutex<DeviceLog>>,
    events: Option<DeviceEvents>,
}

/// Emits a constant signal
struct ConstantTap;

impl OutputTap for ConstantTap {
    fn fill(&mut self, buffer: &mut [f32], _channels: usize) -> usize {
        buffer.fill(1.0);
        buffer.len()
    }
}

impl TransportDevice for MockDevice {
    fn take_events(&mut self) -> Option<DeviceEvents> {
        self.events.take()
    }

    fn bind(&mut self, stream_locator: &str) -> u64 {
        let mut log = self.log.lock().unwrap();
        log.binds.push(stream_locator.to_string());
        log.epoch += 1;
        log.ended = false;
        log.position = 0.0;
        log.epoch
    }

    fn play(&mut self) -> Deferred {
        let mut log = self.log.lock().unwrap();
        log.play_calls += 1;

        if let Some(err) = log.play_failures.pop_front() {
            return Box::pin(async move { Err(err) });
        }

        match log.play_gates.pop_front() {
            Some(gate) => Box::pin(async move {
                gate.await
                    .unwrap_or_else(|_| Err(PlaybackError::SourceUnavailable("gate dropped".into())))
            }),
            None => Box::pin(async { Ok(()) }),
        }
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().pause_calls += 1;
    }

    fn seek(&mut self, position_seconds: f64) {
        let mut log = self.log.lock().unwrap();
        log.seeks.push(position_seconds);
        log.position = position_seconds;
    }

    fn position(&self) -> f64 {
        self.log.lock().unwrap().position
    }

    fn has_ended(&self) -> bool {
        self.log.lock().unwrap().ended
    }

    fn connect_output(&mut self, _format: OutputFormat) -> Result<Box<dyn OutputTap>> {
        let mut log = self.log.lock().unwrap();
        log.connect_calls += 1;
        if log.refuse_output || log.connect_calls > 1 {
            return Err(PlaybackError::ReentrancyGuardTriggered(
                "device output already connected".into(),
            ));
        }
        Ok(Box::new(ConstantTap))
    }
}

#[derive(Clone)]
pub struct DeviceProbe {
    pub log: Arc<Mutex<DeviceLog>>,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceProbe {
    pub fn binds(&self) -> Vec<String> {
        self.log.lock().unwrap().binds.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.log.lock().unwrap().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.log.lock().unwrap().pause_calls
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.log.lock().unwrap().seeks.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.log.lock().unwrap().connect_calls
    }

    pub fn epoch(&self) -> u64 {
        self.log.lock().unwrap().epoch
    }

    pub fn fail_next_play(&self, err: PlaybackError) {
        self.log.lock().unwrap().play_failures.push_back(err);
    }

    pub fn refuse_output(&self) {
        self.log.lock().unwrap().refuse_output = true;
    }

    /// Hold the next `play()` open until the returned sender fires
    pub fn gate_next_play(&self) -> oneshot::Sender<Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.log.lock().unwrap().play_gates.push_back(rx);
        tx
    }

    /// Mark the stream as finished without delivering the event yet
    pub fn reach_end_silently(&self) {
        self.log.lock().unwrap().ended = true;
    }

    /// Emit an event for the current stream
    pub fn emit(&self, kind: DeviceEventKind) {
        let epoch = self.epoch();
        self.emit_for(epoch, kind);
    }

    /// Emit an event stamped with an explicit epoch
    pub fn emit_for(&self, epoch: u64, kind: DeviceEventKind) {
        if matches!(kind, DeviceEventKind::Ended) && epoch == self.epoch() {
            self.log.lock().unwrap().ended = true;
        }
        self.events_tx.send(DeviceEvent::new(epoch, kind)).unwrap();
    }
}

// ===== Harness =====

pub fn mock_pair() -> (MockContext, ContextProbe, MockDevice, DeviceProbe) {
    let context_log = Arc::new(Mutex::new(ContextLog::default()));
    let device_log = Arc::new(Mutex::new(DeviceLog::default()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    (
        MockContext {
            log: Arc::clone(&context_log),
        },
        ContextProbe { log: context_log },
        MockDevice {
            log: Arc::clone(&device_log),
            events: Some(events_rx),
        },
        DeviceProbe {
            log: device_log,
            events_tx,
        },
    )
}

pub fn open_engine() -> (PlaybackEngine, ContextProbe, DeviceProbe) {
    open_engine_with(EngineConfig::default())
}

pub fn open_engine_with(config: EngineConfig) -> (PlaybackEngine, ContextProbe, DeviceProbe) {
    let (context, context_probe, device, device_probe) = mock_pair();
    let engine = PlaybackEngine::open(config, Box::new(context), Box::new(device))
        .expect("engine should open");
    (engine, context_probe, device_probe)
}

/// Wait until the engine state satisfies `predicate`
pub async fn wait_for_state(
    engine: &PlaybackEngine,
    predicate: impl FnMut(&PlaybackState) -> bool,
) -> PlaybackState {
    let mut watch = engine.watch();
    let state = tokio::time::timeout(Duration::from_secs(2), watch.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("engine dropped");
    state.clone()
}

/// Phases seen by a subscription so far
pub fn drained_phases(subscription: &mut PlaybackSubscription) -> Vec<PlaybackPhase> {
    subscription
        .drain()
        .into_iter()
        .filter_map(|notification| match notification {
            PlaybackNotification::StateChanged { state } => Some(state.phase),
            PlaybackNotification::TrackFinished { .. } => None,
        })
        .collect()
}

/// Collapse consecutive duplicates (position ticks republish the same phase)
pub fn distinct(phases: Vec<PlaybackPhase>) -> Vec<PlaybackPhase> {
    let mut out: Vec<PlaybackPhase> = Vec::new();
    for phase in phases {
        if out.last() != Some(&phase) {
            out.push(phase);
        }
    }
    out
}
