//! Decoding transport device
//!
//! `DecoderTransport` plays one bound stream at a time. Opening (fetch, probe,
//! prefill) happens inside the `play()` future off the audio thread; the
//! output tap then pulls decoded frames on the audio thread and reports
//! position ticks, end of stream and decode failures as device events.
//!
//! Control calls and the tap share one `StreamSlot`. The tap only ever
//! `try_lock`s it and renders silence when the control side holds it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tonearm_playback::{
    Deferred, DeviceEvent, DeviceEventKind, DeviceEvents, OutputFormat, OutputTap, PlaybackError,
    TransportDevice,
};
use tracing::{debug, info, warn};

use crate::config::DesktopConfig;
use crate::decoder::StreamDecoder;
use crate::error::{AudioError, Result};
use crate::locator::StreamLocator;

type EventSender = mpsc::UnboundedSender<DeviceEvent>;

/// Playback state of the bound stream, shared with the output tap
#[derive(Default)]
struct StreamSlot {
    epoch: u64,
    format: Option<OutputFormat>,
    decoder: Option<StreamDecoder>,
    playing: bool,
    ended: bool,
    frames_played: u64,
    frames_since_tick: u64,
    /// Seek requested before the stream finished opening
    pending_seek: Option<f64>,
}

impl StreamSlot {
    fn sample_rate(&self) -> f64 {
        self.format
            .map(|format| f64::from(format.sample_rate))
            .unwrap_or(f64::from(OutputFormat::default().sample_rate))
    }

    fn position_seconds(&self) -> f64 {
        self.frames_played as f64 / self.sample_rate()
    }

    fn set_position(&mut self, seconds: f64) {
        self.frames_played = (seconds.max(0.0) * self.sample_rate()) as u64;
        self.frames_since_tick = 0;
    }

    fn install(&mut self, mut decoder: StreamDecoder) {
        if let Some(target) = self.pending_seek.take() {
            match decoder.seek(target) {
                Ok(reached) => self.set_position(reached),
                Err(e) => warn!(error = %e, target, "Initial seek failed"),
            }
        }
        self.decoder = Some(decoder);
    }

    /// Pull frames for one output buffer
    ///
    /// # Returns
    /// Number of samples written (frames * channels)
    fn render(
        &mut self,
        buffer: &mut [f32],
        channels: usize,
        tick_frames: u64,
        events: &EventSender,
    ) -> usize {
        if !self.playing {
            return 0;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return 0;
        };

        let frames = match decoder.read(buffer, channels) {
            Ok(frames) => frames,
            Err(e) => {
                self.playing = false;
                let err = PlaybackError::from(e);
                events
                    .send(DeviceEvent::new(self.epoch, DeviceEventKind::Error(err)))
                    .ok();
                return 0;
            }
        };
        let finished = decoder.is_finished();

        self.frames_played += frames as u64;
        self.frames_since_tick += frames as u64;

        if self.frames_since_tick >= tick_frames || finished {
            self.frames_since_tick = 0;
            events
                .send(DeviceEvent::new(
                    self.epoch,
                    DeviceEventKind::PositionTick(self.position_seconds()),
                ))
                .ok();
        }

        if finished {
            self.playing = false;
            self.ended = true;
            events
                .send(DeviceEvent::new(self.epoch, DeviceEventKind::Ended))
                .ok();
        }

        frames * channels.max(1)
    }
}

fn lock(slot: &Mutex<StreamSlot>) -> MutexGuard<'_, StreamSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport device decoding local files and HTTP streams
pub struct DecoderTransport {
    config: DesktopConfig,
    client: reqwest::Client,
    slot: Arc<Mutex<StreamSlot>>,
    events_tx: EventSender,
    events_rx: Option<DeviceEvents>,
    locator: Option<String>,
    epoch: u64,
    tap_connected: bool,
}

impl DecoderTransport {
    /// Create an idle transport
    ///
    /// # Errors
    /// Invalid configuration, or the HTTP client could not be built
    pub fn new(config: DesktopConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            client,
            slot: Arc::new(Mutex::new(StreamSlot::default())),
            events_tx,
            events_rx: Some(events_rx),
            locator: None,
            epoch: 0,
            tap_connected: false,
        })
    }

    /// Locator of the bound stream
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }
}

impl TransportDevice for DecoderTransport {
    fn take_events(&mut self) -> Option<DeviceEvents> {
        self.events_rx.take()
    }

    fn bind(&mut self, stream_locator: &str) -> u64 {
        self.epoch += 1;
        self.locator = Some(stream_locator.to_string());

        let mut slot = lock(&self.slot);
        let format = slot.format;
        *slot = StreamSlot {
            epoch: self.epoch,
            format,
            ..StreamSlot::default()
        };

        debug!(epoch = self.epoch, locator = stream_locator, "Stream bound");
        self.epoch
    }

    fn play(&mut self) -> Deferred {
        let Some(locator) = self.locator.clone() else {
            return Box::pin(async {
                Err(PlaybackError::InvalidCommand("no stream bound".into()))
            });
        };

        let (format, opened) = {
            let slot = lock(&self.slot);
            (slot.format, slot.decoder.is_some())
        };
        let Some(format) = format else {
            return Box::pin(async {
                Err(PlaybackError::SourceUnavailable(
                    "transport output is not connected".into(),
                ))
            });
        };

        let epoch = self.epoch;
        let slot = Arc::clone(&self.slot);
        let events = self.events_tx.clone();
        let client = self.client.clone();
        let config = self.config.clone();

        Box::pin(async move {
            if !opened {
                let decoder = open_stream(&client, &locator, format.sample_rate, &config)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, locator = %locator, "Failed to open stream");
                        PlaybackError::from(e)
                    })?;
                let duration = decoder.duration_seconds();

                let mut slot = lock(&slot);
                if slot.epoch != epoch {
                    return Err(PlaybackError::Superseded);
                }
                slot.install(decoder);
                if let Some(seconds) = duration {
                    events
                        .send(DeviceEvent::new(epoch, DeviceEventKind::DurationKnown(seconds)))
                        .ok();
                }
                info!(locator = %locator, "Stream opened");
            }

            let mut slot = lock(&slot);
            if slot.epoch != epoch {
                return Err(PlaybackError::Superseded);
            }
            slot.playing = true;
            Ok(())
        })
    }

    fn pause(&mut self) {
        lock(&self.slot).playing = false;
    }

    fn seek(&mut self, position_seconds: f64) {
        let mut slot = lock(&self.slot);
        slot.ended = false;

        let Some(decoder) = slot.decoder.as_mut() else {
            slot.pending_seek = Some(position_seconds);
            slot.set_position(position_seconds);
            return;
        };

        match decoder.seek(position_seconds) {
            Ok(reached) => slot.set_position(reached),
            Err(e) => warn!(error = %e, position_seconds, "Seek failed"),
        }
    }

    fn position(&self) -> f64 {
        lock(&self.slot).position_seconds()
    }

    fn has_ended(&self) -> bool {
        lock(&self.slot).ended
    }

    fn connect_output(
        &mut self,
        format: OutputFormat,
    ) -> tonearm_playback::Result<Box<dyn OutputTap>> {
        if self.tap_connected {
            return Err(PlaybackError::ReentrancyGuardTriggered(
                "transport output already connected".into(),
            ));
        }
        self.tap_connected = true;
        lock(&self.slot).format = Some(format);

        let tick_frames =
            (self.config.position_tick_ms * u64::from(format.sample_rate) / 1000).max(1);

        Ok(Box::new(TransportTap {
            slot: Arc::clone(&self.slot),
            events: self.events_tx.clone(),
            tick_frames,
        }))
    }
}

/// Fetch, probe and prefill a stream
async fn open_stream(
    client: &reqwest::Client,
    locator: &str,
    sample_rate: u32,
    config: &DesktopConfig,
) -> Result<StreamDecoder> {
    let locator = StreamLocator::parse(locator)?;
    let extension = locator.extension();
    let source = locator.open(client).await?;
    let config = config.clone();

    tokio::task::spawn_blocking(move || -> Result<StreamDecoder> {
        let mut decoder = StreamDecoder::open(source, extension.as_deref(), sample_rate, &config)?;
        decoder.prefill()?;
        Ok(decoder)
    })
    .await
    .map_err(|e| AudioError::Decode(format!("decoder task failed: {}", e)))?
}

/// Output side of the transport, run by the audio context
struct TransportTap {
    slot: Arc<Mutex<StreamSlot>>,
    events: EventSender,
    tick_frames: u64,
}

impl OutputTap for TransportTap {
    fn fill(&mut self, buffer: &mut [f32], channels: usize) -> usize {
        match self.slot.try_lock() {
            Ok(mut slot) => slot.render(buffer, channels, self.tick_frames, &self.events),
            Err(_) => 0,
        }
    }
}
