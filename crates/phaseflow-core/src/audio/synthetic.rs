//! Synthetic signal generator
//!
//! The acquisition-failure fallback: a plausible-looking kick pattern plus a
//! little noise, good enough to keep every downstream system alive and
//! visibly moving when no real input exists. Seeded, so replays are
//! deterministic.

use super::spectrum::{SpectrumAnalyzer, SpectrumConfig};
use super::{AudioFrame, AudioSource, InputMode, VolumeMeasure};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration of the synthetic generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Tempo of the generated kick pattern
    #[serde(default = "default_bpm")]
    pub bpm: f32,
    /// Kick fundamental frequency
    #[serde(default = "default_kick_hz")]
    pub kick_hz: f32,
    /// Kick length in milliseconds
    #[serde(default = "default_kick_ms")]
    pub kick_ms: f64,
    /// Broadband noise floor amplitude
    #[serde(default = "default_noise_level")]
    pub noise_level: f32,
    /// RNG seed; fixed so two runs produce identical signals
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_bpm() -> f32 {
    120.0
}
fn default_kick_hz() -> f32 {
    55.0
}
fn default_kick_ms() -> f64 {
    100.0
}
fn default_noise_level() -> f32 {
    0.02
}
fn default_seed() -> u64 {
    0x9e3779b9
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            kick_hz: default_kick_hz(),
            kick_ms: default_kick_ms(),
            noise_level: default_noise_level(),
            seed: default_seed(),
        }
    }
}

/// Synthetic [`AudioSource`] producing a steady kick pattern.
pub struct SyntheticSource {
    analyzer: SpectrumAnalyzer,
    config: SyntheticConfig,
    rng: StdRng,
    sample_rate: u32,
    /// Absolute sample position, the generator's own timeline
    sample_pos: u64,
    last_poll_ms: Option<f64>,
}

impl SyntheticSource {
    /// Create a generator feeding the shared FFT front-end.
    pub fn new(spectrum: SpectrumConfig, config: SyntheticConfig) -> Self {
        let sample_rate = spectrum.sample_rate;
        Self {
            analyzer: SpectrumAnalyzer::new(spectrum),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            sample_rate,
            sample_pos: 0,
            last_poll_ms: None,
        }
    }

    fn generate(&mut self, count: usize) -> Vec<f32> {
        let sr = self.sample_rate as f64;
        let beat_interval_samples = (sr * 60.0 / self.config.bpm as f64).max(1.0) as u64;
        let kick_samples = (self.config.kick_ms / 1000.0 * sr) as u64;

        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let pos_in_beat = self.sample_pos % beat_interval_samples;
            let mut sample = if pos_in_beat < kick_samples {
                // Decaying sine burst
                let t = pos_in_beat as f32 / self.sample_rate as f32;
                let env = 1.0 - pos_in_beat as f32 / kick_samples as f32;
                (2.0 * std::f32::consts::PI * self.config.kick_hz * t).sin() * env
            } else {
                0.0
            };
            sample += (self.rng.random::<f32>() * 2.0 - 1.0) * self.config.noise_level;
            out.push(sample);
            self.sample_pos += 1;
        }
        out
    }
}

impl AudioSource for SyntheticSource {
    fn poll_frame(&mut self, now_ms: f64) -> Option<AudioFrame> {
        let elapsed_ms = match self.last_poll_ms {
            Some(last) => (now_ms - last).max(0.0),
            // First poll primes a full analysis window
            None => 50.0,
        };
        self.last_poll_ms = Some(now_ms);

        let count = (elapsed_ms / 1000.0 * self.sample_rate as f64).round() as usize;
        if count > 0 {
            let samples = self.generate(count.min(self.sample_rate as usize));
            self.analyzer.push_samples(&samples);
        }
        self.analyzer.take_frame(now_ms)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Synthetic
    }

    fn volume(&self) -> VolumeMeasure {
        self.analyzer.volume()
    }
}
