//! Spectral analysis stage
//!
//! A pass-through tap that keeps the last `fft_size` mono samples, computes a
//! Hann-windowed FFT once per `fft_size` frames and publishes the smoothed
//! magnitude spectrum for visualizers.

use std::sync::{Arc, Mutex, PoisonError};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::EngineConfig;

/// Latest published analysis results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFrame {
    /// Smoothed magnitude per frequency bin in dB (`fft_size / 2` bins)
    pub frequency_db: Vec<f32>,

    /// Last `fft_size` mono samples, oldest first
    pub time_domain: Vec<f32>,

    /// RMS level of the analysed window
    pub rms: f32,

    /// Number of analysis passes published so far
    pub generation: u64,
}

/// Read handle on the analysis stage
#[derive(Debug, Clone)]
pub struct AnalyserHandle {
    frame: Arc<Mutex<AnalysisFrame>>,
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
}

impl AnalyserHandle {
    /// Create an empty handle; the stage attaches to it when the graph is built
    pub fn new(config: &EngineConfig) -> Self {
        let frame = AnalysisFrame {
            frequency_db: vec![config.min_decibels; config.fft_size / 2],
            time_domain: vec![0.0; config.fft_size],
            rms: 0.0,
            generation: 0,
        };

        Self {
            frame: Arc::new(Mutex::new(frame)),
            fft_size: config.fft_size,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    /// FFT window length
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (`fft_size / 2`)
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Copy of the latest frame
    pub fn frame(&self) -> AnalysisFrame {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Magnitude spectrum in dB
    pub fn frequency_data(&self) -> Vec<f32> {
        self.frame().frequency_db
    }

    /// Spectrum scaled into 0-255 between the configured dB floor and ceiling
    pub fn byte_frequency_data(&self) -> Vec<u8> {
        let range = self.max_decibels - self.min_decibels;
        self.frequency_data()
            .into_iter()
            .map(|db| {
                let scaled = 255.0 * (db - self.min_decibels) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Waveform of the analysed window
    pub fn time_domain_data(&self) -> Vec<f32> {
        self.frame().time_domain
    }

    /// RMS level of the analysed window
    pub fn level(&self) -> f32 {
        self.frame().rms
    }
}

/// Render-side analysis node
pub struct AnalysisStage {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    since_last: usize,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    generation: u64,
    shared: Arc<Mutex<AnalysisFrame>>,
}

impl AnalysisStage {
    /// Create a stage publishing into `handle`
    ///
    /// All buffers are allocated here; [`process`](Self::process) does not allocate.
    pub fn new(handle: &AnalyserHandle, config: &EngineConfig) -> Self {
        let fft_size = handle.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos())
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
            history: vec![0.0; fft_size],
            write_pos: 0,
            since_last: 0,
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.smoothing,
            min_decibels: handle.min_decibels,
            generation: 0,
            shared: Arc::clone(&handle.frame),
        }
    }

    /// Observe a buffer of interleaved samples (left untouched)
    pub fn process(&mut self, buffer: &[f32], channels: usize) {
        let channels = channels.max(1);

        for frame in buffer.chunks(channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.history[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
            self.since_last += 1;

            if self.since_last >= self.fft_size {
                self.since_last = 0;
                self.analyse();
            }
        }
    }

    fn analyse(&mut self) {
        let n = self.fft_size;

        let mut energy = 0.0f32;
        for i in 0..n {
            let sample = self.history[(self.write_pos + i) % n];
            energy += sample * sample;
            self.spectrum[i] = Complex::new(sample * self.window[i], 0.0);
        }
        let rms = (energy / n as f32).sqrt();

        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let norm = 1.0 / n as f32;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.spectrum[bin].norm() * norm;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }

        self.generation += 1;

        // Skip publishing rather than block the render thread
        let Ok(mut frame) = self.shared.try_lock() else {
            return;
        };

        for (db, &magnitude) in frame.frequency_db.iter_mut().zip(&self.smoothed) {
            *db = if magnitude > 0.0 {
                (20.0 * magnitude.log10()).max(self.min_decibels)
            } else {
                self.min_decibels
            };
        }
        for (i, sample) in frame.time_domain.iter_mut().enumerate() {
            *sample = self.history[(self.write_pos + i) % n];
        }
        frame.rms = rms;
        frame.generation = self.generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * freq * t).sin();
            samples.push(sample);
            samples.push(sample);
        }
        samples
    }

    fn small_stage() -> (AnalysisStage, AnalyserHandle) {
        let config = EngineConfig {
            fft_size: 1024,
            smoothing: 0.0,
            ..EngineConfig::default()
        };
        let handle = AnalyserHandle::new(&config);
        (AnalysisStage::new(&handle, &config), handle)
    }

    #[test]
    fn nothing_published_before_a_full_window() {
        let (mut stage, handle) = small_stage();
        stage.process(&stereo_sine(440.0, 44100, 512), 2);

        let frame = handle.frame();
        assert_eq!(frame.generation, 0);
        assert_eq!(frame.frequency_db.len(), 512);
        assert!(frame.frequency_db.iter().all(|&db| db == -100.0));
    }

    #[test]
    fn sine_peak_lands_in_expected_bin() {
        let sample_rate = 44100;
        let (mut stage, handle) = small_stage();

        // Bin-centred frequency: bin 40
        let freq = 40.0 * sample_rate as f32 / 1024.0;
        stage.process(&stereo_sine(freq, sample_rate, 1024), 2);

        let spectrum = handle.frequency_data();
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        assert_eq!(peak, 40);
        assert_eq!(handle.frame().generation, 1);
    }

    #[test]
    fn rms_of_full_scale_sine() {
        let (mut stage, handle) = small_stage();
        let freq = 40.0 * 44100.0 / 1024.0;
        stage.process(&stereo_sine(freq, 44100, 1024), 2);

        let rms = handle.level();
        assert!((rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01, "rms = {}", rms);
    }

    #[test]
    fn silence_reports_floor() {
        let (mut stage, handle) = small_stage();
        stage.process(&vec![0.0; 2048], 2);

        assert!(handle.frequency_data().iter().all(|&db| db == -100.0));
        assert!(handle.byte_frequency_data().iter().all(|&b| b == 0));
        assert_eq!(handle.level(), 0.0);
    }

    #[test]
    fn process_does_not_modify_input() {
        let (mut stage, _handle) = small_stage();
        let input = stereo_sine(1000.0, 44100, 2000);
        let copy = input.clone();
        stage.process(&input, 2);
        assert_eq!(input, copy);
    }

    #[test]
    fn time_domain_is_mono_mix() {
        let (mut stage, handle) = small_stage();
        let mut input = Vec::with_capacity(2048);
        for _ in 0..1024 {
            input.push(1.0);
            input.push(0.0);
        }
        stage.process(&input, 2);

        let waveform = handle.time_domain_data();
        assert_eq!(waveform.len(), 1024);
        assert!(waveform.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}
