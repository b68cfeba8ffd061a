//! FFT front-end
//!
//! Converts a raw sample stream into [`AudioFrame`] snapshots: ring-buffered
//! input, Hann window, overlapping hops, dB-scale magnitudes with per-bin
//! smoothing, plus RMS/peak loudness tracking.

use super::{AudioFrame, VolumeMeasure};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Configuration for the FFT front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Sample rate of the input stream
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// FFT size (power of 2)
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Overlap ratio between consecutive analysis windows (0.0 - 1.0)
    #[serde(default = "default_overlap")]
    pub overlap: f32,
    /// Exponential smoothing factor for magnitudes and loudness
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Magnitude floor in dB; silence and denormals land here
    #[serde(default = "default_db_floor")]
    pub db_floor: f32,
}

fn default_sample_rate() -> u32 {
    44100
}
fn default_fft_size() -> usize {
    2048
}
fn default_overlap() -> f32 {
    0.5
}
fn default_smoothing() -> f32 {
    0.7
}
fn default_db_floor() -> f32 {
    -100.0
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            fft_size: default_fft_size(),
            overlap: default_overlap(),
            smoothing: default_smoothing(),
            db_floor: default_db_floor(),
        }
    }
}

/// Streaming FFT analyzer with proper sample buffering.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    config: SpectrumConfig,

    /// Input sample ring buffer
    input_buffer: Vec<f32>,
    buffer_write_pos: usize,
    samples_since_fft: usize,
    /// Samples between analysis windows
    hop_size: usize,

    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    /// Hann window coefficients
    window: Vec<f32>,

    /// Smoothed linear magnitudes (positive frequencies only)
    smoothed_magnitudes: Vec<f32>,
    /// Time-domain copy of the last analyzed window
    window_samples: Vec<f32>,

    rms_volume: f32,
    smoothed_rms: f32,
    peak_volume: f32,

    total_samples: u64,
    fft_count: u64,
    /// Set when an FFT has run since the last frame was taken
    frame_pending: bool,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer with the given configuration.
    pub fn new(config: SpectrumConfig) -> Self {
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let half_size = fft_size / 2;
        let hop_size = (((1.0 - config.overlap) * fft_size as f32) as usize).max(1);

        let window = hann_window(fft_size);

        debug!(
            "SpectrumAnalyzer created: sample_rate={}, fft_size={}, hop_size={}",
            config.sample_rate, fft_size, hop_size
        );

        Self {
            fft,
            config,
            input_buffer: vec![0.0; fft_size],
            buffer_write_pos: 0,
            samples_since_fft: 0,
            hop_size,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            window,
            smoothed_magnitudes: vec![0.0; half_size],
            window_samples: vec![0.0; fft_size],
            rms_volume: 0.0,
            smoothed_rms: 0.0,
            peak_volume: 0.0,
            total_samples: 0,
            fft_count: 0,
            frame_pending: false,
        }
    }

    /// Feed raw samples. NaN/Inf inputs are replaced with 0.0 before they can
    /// contaminate any analysis metric.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let sanitized: Vec<f32> = samples
            .iter()
            .map(|&s| if s.is_finite() { s } else { 0.0 })
            .collect();
        let samples = &sanitized;

        self.total_samples += samples.len() as u64;

        // RMS with exponential smoothing
        self.rms_volume = calculate_rms(samples);
        self.smoothed_rms = self.smoothed_rms * self.config.smoothing
            + self.rms_volume * (1.0 - self.config.smoothing);

        // Peak: fast attack, slow decay
        let max_sample = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        if max_sample > self.peak_volume {
            self.peak_volume = max_sample;
        } else {
            self.peak_volume *= 0.995;
        }

        for &sample in samples {
            self.input_buffer[self.buffer_write_pos] = sample;
            self.buffer_write_pos = (self.buffer_write_pos + 1) % self.config.fft_size;
            self.samples_since_fft += 1;

            if self.samples_since_fft >= self.hop_size
                && self.total_samples >= self.config.fft_size as u64
            {
                self.perform_fft();
                self.samples_since_fft = 0;
            }
        }
    }

    fn perform_fft(&mut self) {
        self.fft_count += 1;

        // Unwrap the ring buffer; the write position is the oldest sample
        for i in 0..self.config.fft_size {
            let src_idx = (self.buffer_write_pos + i) % self.config.fft_size;
            let sample = self.input_buffer[src_idx];
            self.window_samples[i] = sample;
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let half_size = self.smoothed_magnitudes.len();
        let norm_factor = 1.0 / (self.config.fft_size as f32).sqrt();

        for i in 0..half_size {
            let magnitude = self.fft_buffer[i].norm() * norm_factor;
            self.smoothed_magnitudes[i] = self.smoothed_magnitudes[i] * self.config.smoothing
                + magnitude * (1.0 - self.config.smoothing);
        }

        self.frame_pending = true;

        if self.fft_count % 100 == 0 {
            trace!(
                "FFT #{}: rms={:.4} peak={:.4}",
                self.fft_count,
                self.smoothed_rms,
                self.peak_volume
            );
        }
    }

    /// Take the pending frame, if an analysis window completed since the last
    /// call. `timestamp_ms` is stamped onto the frame; the analyzer itself
    /// never reads a clock.
    pub fn take_frame(&mut self, timestamp_ms: f64) -> Option<AudioFrame> {
        if !self.frame_pending {
            return None;
        }
        self.frame_pending = false;

        let floor_linear = db_to_linear(self.config.db_floor);
        let frequency_db: Vec<f32> = self
            .smoothed_magnitudes
            .iter()
            .map(|&m| linear_to_db(m.max(floor_linear)))
            .collect();

        // Validation cannot fail here: the spectrum is non-empty and every
        // value above is finite by construction.
        AudioFrame::new(
            timestamp_ms,
            self.config.sample_rate,
            frequency_db,
            self.window_samples.clone(),
            self.config.db_floor,
        )
        .ok()
    }

    /// Loudness of the most recent window.
    pub fn volume(&self) -> VolumeMeasure {
        VolumeMeasure {
            rms: self.smoothed_rms,
            peak: self.peak_volume,
        }
    }

    /// Total samples consumed since creation or the last reset.
    pub fn samples_processed(&self) -> u64 {
        self.total_samples
    }

    /// Number of completed analysis windows.
    pub fn frames_analyzed(&self) -> u64 {
        self.fft_count
    }

    /// Current sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Reset all analysis state.
    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.buffer_write_pos = 0;
        self.samples_since_fft = 0;
        self.smoothed_magnitudes.fill(0.0);
        self.window_samples.fill(0.0);
        self.rms_volume = 0.0;
        self.smoothed_rms = 0.0;
        self.peak_volume = 0.0;
        self.total_samples = 0;
        self.fft_count = 0;
        self.frame_pending = false;

        debug!("SpectrumAnalyzer reset");
    }

    /// Apply a new configuration, resizing buffers when the FFT size changed.
    pub fn update_config(&mut self, config: SpectrumConfig) {
        if config.fft_size != self.config.fft_size {
            let mut planner = FftPlanner::new();
            self.fft = planner.plan_fft_forward(config.fft_size);

            let half_size = config.fft_size / 2;
            self.input_buffer = vec![0.0; config.fft_size];
            self.fft_buffer = vec![Complex::new(0.0, 0.0); config.fft_size];
            self.scratch_buffer = vec![Complex::new(0.0, 0.0); config.fft_size];
            self.smoothed_magnitudes = vec![0.0; half_size];
            self.window_samples = vec![0.0; config.fft_size];
            self.window = hann_window(config.fft_size);
            self.buffer_write_pos = 0;
            self.samples_since_fft = 0;
            self.frame_pending = false;
        }

        self.hop_size = (((1.0 - config.overlap) * config.fft_size as f32) as usize).max(1);
        self.config = config;

        debug!("SpectrumAnalyzer config updated, hop_size={}", self.hop_size);
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
        })
        .collect()
}

fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Linear magnitude to dB.
pub fn linear_to_db(m: f32) -> f32 {
    20.0 * m.log10()
}

/// dB to linear magnitude.
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, count: usize) -> Vec<f32> {
        (0..count)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_create_analyzer() {
        let analyzer = SpectrumAnalyzer::new(SpectrumConfig::default());
        assert_eq!(analyzer.sample_rate(), 44100);
        assert_eq!(analyzer.frames_analyzed(), 0);
    }

    #[test]
    fn test_rms_of_sine() {
        // Sine wave at 0.5 amplitude has RMS of ~0.35
        let samples = sine(440.0, 44100.0, 4096);
        let rms = calculate_rms(&samples);
        assert!(rms > 0.3 && rms < 0.4, "RMS was {}", rms);
    }

    #[test]
    fn test_frame_production() {
        let config = SpectrumConfig {
            fft_size: 1024,
            ..Default::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(config);

        assert!(analyzer.take_frame(0.0).is_none(), "no samples, no frame");

        analyzer.push_samples(&sine(440.0, 44100.0, 4096));
        let frame = analyzer.take_frame(10.0).expect("frame after 4096 samples");

        assert_eq!(frame.timestamp_ms, 10.0);
        assert_eq!(frame.bin_count(), 512);
        assert_eq!(frame.time_samples.len(), 1024);

        // Taking again without new samples yields nothing
        assert!(analyzer.take_frame(20.0).is_none());
    }

    #[test]
    fn test_tone_appears_in_correct_bin() {
        let config = SpectrumConfig {
            fft_size: 2048,
            smoothing: 0.0,
            ..Default::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(config);
        analyzer.push_samples(&sine(1000.0, 44100.0, 8192));

        let frame = analyzer.take_frame(0.0).unwrap();
        let loudest = frame
            .frequency_db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        let freq = frame.bin_frequency(loudest);
        assert!(
            (freq - 1000.0).abs() < 2.0 * frame.bin_hz(),
            "expected peak near 1 kHz, found {} Hz",
            freq
        );
    }

    #[test]
    fn test_silence_stays_at_floor() {
        let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig {
            fft_size: 1024,
            ..Default::default()
        });
        analyzer.push_samples(&vec![0.0; 4096]);

        let frame = analyzer.take_frame(0.0).unwrap();
        for &db in &frame.frequency_db {
            assert!(db.is_finite());
            assert!(db <= -99.0, "silent bin above floor: {} dB", db);
        }
    }

    #[test]
    fn test_resilience_to_bad_input() {
        let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig::default());
        analyzer.push_samples(&[f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 0.0]);

        let vol = analyzer.volume();
        assert!(vol.rms.is_finite());
        assert!(vol.peak.is_finite());
        assert_eq!(vol.rms, 0.0);
        assert_eq!(vol.peak, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut analyzer = SpectrumAnalyzer::new(SpectrumConfig {
            fft_size: 1024,
            ..Default::default()
        });
        analyzer.push_samples(&sine(440.0, 44100.0, 4096));
        assert!(analyzer.volume().rms > 0.0);

        analyzer.reset();
        assert_eq!(analyzer.volume().rms, 0.0);
        assert_eq!(analyzer.samples_processed(), 0);
        assert!(analyzer.take_frame(0.0).is_none());
    }

    #[test]
    fn test_update_config_resizes_buffers() {
        let mut config = SpectrumConfig {
            fft_size: 1024,
            ..Default::default()
        };
        let mut analyzer = SpectrumAnalyzer::new(config.clone());
        assert_eq!(analyzer.smoothed_magnitudes.len(), 512);

        config.fft_size = 2048;
        analyzer.update_config(config);
        assert_eq!(analyzer.input_buffer.len(), 2048);
        assert_eq!(analyzer.smoothed_magnitudes.len(), 1024);
        assert_eq!(analyzer.fft_buffer.len(), 2048);
    }
}
