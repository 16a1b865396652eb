//! Streaming Symphonia decoder
//!
//! Decodes packets on demand into a bounded queue of interleaved stereo f32
//! samples at the output sample rate.
//!
//! ## Conversion
//!
//! 1. **Interleaving** (`interleave_to_stereo_f32`): any planar sample type
//!    plus a normalisation function becomes interleaved stereo f32; mono is
//!    duplicated, extra channels are dropped.
//! 2. **Normalisation** (`convert_to_stereo_f32`): float formats pass through,
//!    signed integers divide by their MAX, unsigned integers are re-centred
//!    around zero.
//! 3. **Resampling** (`StereoResampler`): Rubato `SincFixedIn` fed in fixed
//!    chunks; a partial chunk waits for the next packet and is flushed at
//!    end of stream.

use std::collections::VecDeque;
use std::time::Duration;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::{debug, warn};

use crate::config::{DesktopConfig, ResamplingQuality};
use crate::error::{AudioError, Result};

/// Decoded channels kept in the queue
const STEREO: usize = 2;

/// Streaming decoder for one bound stream
pub struct StreamDecoder {
    source_sample_rate: u32,
    target_sample_rate: u32,

    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: TimeBase,
    duration_seconds: Option<f64>,

    /// Interleaved stereo at `target_sample_rate`
    buffer: VecDeque<f32>,
    buffer_capacity: usize,
    low_water: usize,

    resampler: Option<StereoResampler>,
    is_eof: bool,

    /// Source frames to drop after an accurate seek landed early
    skip_frames: u64,
}

impl StreamDecoder {
    /// Probe `source` and prepare decoding at `target_sample_rate`
    ///
    /// # Arguments
    /// * `source` - Media bytes (file, in-memory download)
    /// * `extension` - File extension hint for the prober, if known
    /// * `target_sample_rate` - Output sample rate
    /// * `config` - Buffering and resampling settings
    ///
    /// # Returns
    /// * `Ok(decoder)` - Ready to read; nothing decoded yet
    /// * `Err(_)` - Unsupported container/codec or unreadable stream
    pub fn open(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        target_sample_rate: u32,
        config: &DesktopConfig,
    ) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let format_options = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &format_options,
            &MetadataOptions::default(),
        )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::UnsupportedFormat("no audio track".into()))?;

        let source_sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AudioError::UnsupportedFormat("unknown sample rate".into()))?;
        let track_id = track.id;
        let time_base = track
            .codec_params
            .time_base
            .unwrap_or(TimeBase::new(1, source_sample_rate));
        let duration_seconds = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / f64::from(source_sample_rate))
            .filter(|seconds| *seconds > 0.0);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let resampler = if source_sample_rate == target_sample_rate {
            None
        } else {
            Some(StereoResampler::new(
                source_sample_rate,
                target_sample_rate,
                config.resampling,
            )?)
        };

        debug!(
            source_sample_rate,
            target_sample_rate,
            duration = ?duration_seconds,
            resampling = resampler.is_some(),
            "Stream opened"
        );

        let buffer_capacity = config.buffer_seconds * target_sample_rate as usize * STEREO;

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            format_reader,
            decoder,
            track_id,
            time_base,
            duration_seconds,
            buffer: VecDeque::with_capacity(buffer_capacity),
            buffer_capacity,
            low_water: buffer_capacity / 4,
            resampler,
            is_eof: false,
            skip_frames: 0,
        })
    }

    /// Decode ahead until half the buffer is filled
    ///
    /// Called off the audio thread so the first callbacks find audio ready.
    pub fn prefill(&mut self) -> Result<()> {
        self.fill_to(self.buffer_capacity / 2)
    }

    /// Read up to `out.len() / channels` frames into `out`
    ///
    /// Stereo is mapped onto the output layout: mono outputs get the average,
    /// outputs with more than two channels get silence on the extra ones.
    ///
    /// # Returns
    /// Number of frames written
    pub fn read(&mut self, out: &mut [f32], channels: usize) -> Result<usize> {
        let channels = channels.max(1);
        let frames_wanted = out.len() / channels;

        if self.buffer.len() < self.low_water.max(frames_wanted * STEREO) {
            self.fill_to(self.low_water + frames_wanted * STEREO)?;
        }

        let frames = (self.buffer.len() / STEREO).min(frames_wanted);
        for frame in out.chunks_exact_mut(channels).take(frames) {
            let (Some(left), Some(right)) = (self.buffer.pop_front(), self.buffer.pop_front())
            else {
                break;
            };
            write_frame(frame, left, right);
        }

        Ok(frames)
    }

    /// Seek to `seconds`
    ///
    /// # Returns
    /// The position actually reached, in seconds
    pub fn seek(&mut self, seconds: f64) -> Result<f64> {
        let time = Duration::from_secs_f64(seconds.max(0.0)).into();
        let ts = self.time_base.calc_timestamp(time);

        self.buffer.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }

        let seeked = match self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts,
                track_id: self.track_id,
            },
        ) {
            Ok(seeked) => seeked,
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                debug!(seconds, "Seek past end of stream");
                self.is_eof = true;
                return Ok(self.duration_seconds.unwrap_or(seconds));
            }
            Err(err) => return Err(err.into()),
        };

        self.decoder.reset();
        self.is_eof = false;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);

        let reached = self.time_base.calc_time(seeked.required_ts);
        Ok(reached.seconds as f64 + reached.frac)
    }

    /// Total duration, when the container reports it
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Sample rate of the stream itself
    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Everything decoded has been read
    pub fn is_finished(&self) -> bool {
        self.is_eof && self.buffer.is_empty()
    }

    fn fill_to(&mut self, samples: usize) -> Result<()> {
        let target = samples.min(self.buffer_capacity.max(STEREO));
        while self.buffer.len() < target && !self.is_eof {
            self.decode_next_packet()?;
        }
        Ok(())
    }

    /// Decode one packet into the queue
    fn decode_next_packet(&mut self) -> Result<()> {
        let packet = match self.format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return self.finish();
            }
            Err(SymphoniaError::ResetRequired) => {
                // Track list changed mid-stream (chained OGG); treat as the end
                return self.finish();
            }
            Err(err) => return Err(err.into()),
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        let mut samples = match self.decoder.decode(&packet) {
            Ok(decoded) => convert_to_stereo_f32(decoded),
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "Skipping undecodable packet");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if self.skip_frames > 0 {
            let available = (samples.len() / STEREO) as u64;
            let skipped = self.skip_frames.min(available);
            samples.drain(..skipped as usize * STEREO);
            self.skip_frames -= skipped;
        }

        match self.resampler.as_mut() {
            Some(resampler) => resampler.push(&samples, &mut self.buffer),
            None => {
                self.buffer.extend(samples);
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.is_eof = true;
        match self.resampler.as_mut() {
            Some(resampler) => resampler.flush(&mut self.buffer),
            None => Ok(()),
        }
    }
}

/// Chunked stereo sinc resampler
struct StereoResampler {
    inner: SincFixedIn<f32>,
    ratio: f64,
    pending: [Vec<f32>; STEREO],
}

impl StereoResampler {
    fn new(source_rate: u32, target_rate: u32, quality: ResamplingQuality) -> Result<Self> {
        let interpolation = match quality {
            ResamplingQuality::Fast => SincInterpolationType::Linear,
            _ => SincInterpolationType::Cubic,
        };

        let params = SincInterpolationParameters {
            sinc_len: quality.sinc_len(),
            f_cutoff: quality.f_cutoff(),
            interpolation,
            oversampling_factor: quality.oversampling_factor(),
            window: WindowFunction::BlackmanHarris2,
        };

        // 0.1 second input chunks
        let chunk_frames = (source_rate as usize / 10).max(1);
        let ratio = f64::from(target_rate) / f64::from(source_rate);

        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_frames, STEREO)
            .map_err(|e| AudioError::ResampleError(e.to_string()))?;

        Ok(Self {
            inner,
            ratio,
            pending: [
                Vec::with_capacity(chunk_frames * 2),
                Vec::with_capacity(chunk_frames * 2),
            ],
        })
    }

    /// Queue interleaved stereo input and emit every complete chunk
    fn push(&mut self, interleaved: &[f32], out: &mut VecDeque<f32>) -> Result<()> {
        for frame in interleaved.chunks_exact(STEREO) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }

        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                return Ok(());
            }

            let chunk = [&self.pending[0][..needed], &self.pending[1][..needed]];
            let resampled = self
                .inner
                .process(&chunk[..], None)
                .map_err(|e| AudioError::ResampleError(e.to_string()))?;
            interleave_into(&resampled, resampled[0].len(), out);

            for channel in &mut self.pending {
                channel.drain(..needed);
            }
        }
    }

    /// Resample whatever input is left at end of stream
    fn flush(&mut self, out: &mut VecDeque<f32>) -> Result<()> {
        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Ok(());
        }

        let chunk = [&self.pending[0][..], &self.pending[1][..]];
        let resampled = self
            .inner
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| AudioError::ResampleError(e.to_string()))?;

        // The partial chunk is zero-padded; keep only the real frames
        let frames = ((remaining as f64 * self.ratio).round() as usize).min(resampled[0].len());
        interleave_into(&resampled, frames, out);

        for channel in &mut self.pending {
            channel.clear();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.inner.reset();
        for channel in &mut self.pending {
            channel.clear();
        }
    }
}

fn interleave_into(planar: &[Vec<f32>], frames: usize, out: &mut VecDeque<f32>) {
    for frame_idx in 0..frames {
        for channel in planar.iter().take(STEREO) {
            out.push_back(channel[frame_idx]);
        }
    }
}

/// Map one stereo frame onto an output frame of any width
fn write_frame(frame: &mut [f32], left: f32, right: f32) {
    match frame {
        [mono] => *mono = (left + right) * 0.5,
        [l, r, rest @ ..] => {
            *l = left;
            *r = right;
            rest.fill(0.0);
        }
        [] => {}
    }
}

/// Interleave a planar buffer of any sample type to stereo f32
///
/// # Type Parameters
/// * `T` - Sample type (i8, i16, i32, u8, u16, u32, f32, f64, etc.)
/// * `F` - Normalization function: T -> f32 in range [-1.0, 1.0]
fn interleave_to_stereo_f32<T, F>(
    buf: &symphonia::core::audio::AudioBuffer<T>,
    normalize: F,
) -> Vec<f32>
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let mut output = Vec::with_capacity(frames * STEREO);

    let left = buf.chan(0);
    let right = if channels > 1 { buf.chan(1) } else { left };

    for frame_idx in 0..frames {
        output.push(normalize(left[frame_idx]));
        output.push(normalize(right[frame_idx]));
    }

    output
}

/// Convert a decoded buffer to interleaved stereo f32 in [-1.0, 1.0]
fn convert_to_stereo_f32(decoded: AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => interleave_to_stereo_f32(&buf, |s| s),
        AudioBufferRef::F64(buf) => interleave_to_stereo_f32(&buf, |s| s as f32),

        AudioBufferRef::S8(buf) => interleave_to_stereo_f32(&buf, |s| s as f32 / i8::MAX as f32),
        AudioBufferRef::S16(buf) => {
            interleave_to_stereo_f32(&buf, |s| s as f32 / i16::MAX as f32)
        }
        AudioBufferRef::S24(buf) => {
            interleave_to_stereo_f32(&buf, |s| s.inner() as f32 / 8388607.0)
        }
        AudioBufferRef::S32(buf) => {
            interleave_to_stereo_f32(&buf, |s| s as f32 / i32::MAX as f32)
        }

        AudioBufferRef::U8(buf) => {
            interleave_to_stereo_f32(&buf, |s| (s as f32 / u8::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U16(buf) => {
            interleave_to_stereo_f32(&buf, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U24(buf) => {
            interleave_to_stereo_f32(&buf, |s| (s.inner() as f32 / 16777215.0) * 2.0 - 1.0)
        }
        AudioBufferRef::U32(buf) => {
            interleave_to_stereo_f32(&buf, |s| (s as f32 / u32::MAX as f32) * 2.0 - 1.0)
        }
    }
}
