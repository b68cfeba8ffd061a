//! Beat and tempo tracking
//!
//! Energy-threshold beat detection with a refractory debounce, plus a
//! smoothed BPM estimate from the beat interval history. This is
//! deliberately not an autocorrelation tempo tracker; on syncopated material
//! it can lock to double or half the true tempo, and downstream consumers
//! treat the confidence score accordingly.

use crate::bands::BandMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Beat detector tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatConfig {
    /// A beat requires current energy above `energy_ratio` x the recent mean
    #[serde(default = "default_energy_ratio")]
    pub energy_ratio: f32,
    /// How many recent energy samples form the comparison baseline
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,
    /// Minimum spacing between accepted beats
    #[serde(default = "default_refractory_ms")]
    pub refractory_ms: f64,
    /// Absolute energy floor below which nothing counts as a beat
    #[serde(default = "default_min_energy")]
    pub min_energy: f32,
    /// Capacity of the total-energy history ring
    #[serde(default = "default_energy_history")]
    pub energy_history: usize,
    /// Capacity of the beat-timestamp history ring
    #[serde(default = "default_beat_history")]
    pub beat_history: usize,
    /// BPM clamp range, low end
    #[serde(default = "default_bpm_min")]
    pub bpm_min: f32,
    /// BPM clamp range, high end
    #[serde(default = "default_bpm_max")]
    pub bpm_max: f32,
    /// Weight of the previous BPM in the exponential blend
    #[serde(default = "default_bpm_blend")]
    pub bpm_blend: f32,
    /// Divisor normalizing interval variance into the [0,1] complexity score
    #[serde(default = "default_complexity_scale")]
    pub complexity_scale: f32,
}

fn default_energy_ratio() -> f32 {
    1.5
}
fn default_baseline_window() -> usize {
    10
}
fn default_refractory_ms() -> f64 {
    300.0
}
fn default_min_energy() -> f32 {
    0.01
}
fn default_energy_history() -> usize {
    50
}
fn default_beat_history() -> usize {
    20
}
fn default_bpm_min() -> f32 {
    60.0
}
fn default_bpm_max() -> f32 {
    200.0
}
fn default_bpm_blend() -> f32 {
    0.8
}
fn default_complexity_scale() -> f32 {
    10_000.0
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            energy_ratio: default_energy_ratio(),
            baseline_window: default_baseline_window(),
            refractory_ms: default_refractory_ms(),
            min_energy: default_min_energy(),
            energy_history: default_energy_history(),
            beat_history: default_beat_history(),
            bpm_min: default_bpm_min(),
            bpm_max: default_bpm_max(),
            bpm_blend: default_bpm_blend(),
            complexity_scale: default_complexity_scale(),
        }
    }
}

/// Result of one observation tick.
#[derive(Debug, Clone, Copy)]
pub struct BeatObservation {
    /// A beat was accepted this tick
    pub beat_detected: bool,
    /// How far the energy exceeded the threshold, (current - thr) / thr
    pub strength: f32,
    /// Current smoothed BPM estimate
    pub bpm: f32,
    /// Tracker confidence in [0, 1]
    pub confidence: f32,
    /// Normalized beat-interval variance in [0, 1]
    pub rhythm_complexity: f32,
}

/// Read-only snapshot of tracker state for the coherence engine.
#[derive(Debug, Clone, Copy)]
pub struct BeatSnapshot {
    /// Current smoothed BPM
    pub bpm: f32,
    /// Timestamp of the last accepted beat, if any
    pub last_beat_ms: Option<f64>,
    /// Total beats accepted since creation
    pub beat_count: u64,
    /// Tracker confidence in [0, 1]
    pub confidence: f32,
    /// Normalized beat-interval variance in [0, 1]
    pub rhythm_complexity: f32,
}

impl BeatSnapshot {
    /// Length of one beat at the current tempo.
    pub fn beat_interval_ms(&self) -> f64 {
        60_000.0 / self.bpm as f64
    }
}

/// Rolling-energy beat detector and tempo estimator.
pub struct BeatTracker {
    config: BeatConfig,
    energy_history: VecDeque<f32>,
    beat_history: VecDeque<f64>,
    current_bpm: f32,
    last_beat_ms: Option<f64>,
    beat_count: u64,
    confidence: f32,
    rhythm_complexity: f32,
}

impl BeatTracker {
    /// Insufficient-data default for rhythm complexity.
    const DEFAULT_COMPLEXITY: f32 = 0.5;

    /// Create a tracker. BPM starts at 120 until enough beats arrive.
    pub fn new(config: BeatConfig) -> Self {
        Self {
            energy_history: VecDeque::with_capacity(config.energy_history),
            beat_history: VecDeque::with_capacity(config.beat_history),
            config,
            current_bpm: 120.0,
            last_beat_ms: None,
            beat_count: 0,
            confidence: 0.0,
            rhythm_complexity: Self::DEFAULT_COMPLEXITY,
        }
    }

    /// Observe one frame's band energies at `timestamp_ms`.
    pub fn observe(&mut self, bands: &BandMap, timestamp_ms: f64) -> BeatObservation {
        let total_energy = bands.total_energy();

        self.energy_history.push_back(total_energy);
        if self.energy_history.len() > self.config.energy_history {
            self.energy_history.pop_front();
        }

        let baseline = self.baseline_mean();
        let threshold = baseline * self.config.energy_ratio;

        let refractory_ok = match self.last_beat_ms {
            Some(last) => timestamp_ms - last >= self.config.refractory_ms,
            None => true,
        };

        let beat_detected = total_energy > threshold
            && total_energy > self.config.min_energy
            && refractory_ok;

        let strength = if beat_detected && threshold > 0.0 {
            (total_energy - threshold) / threshold
        } else {
            0.0
        };

        if beat_detected {
            self.accept_beat(timestamp_ms);
            trace!(
                "Beat at {:.1} ms: energy={:.4} thr={:.4} bpm={:.1}",
                timestamp_ms,
                total_energy,
                threshold,
                self.current_bpm
            );
        }

        BeatObservation {
            beat_detected,
            strength,
            bpm: self.current_bpm,
            confidence: self.confidence,
            rhythm_complexity: self.rhythm_complexity,
        }
    }

    fn baseline_mean(&self) -> f32 {
        let window = self.config.baseline_window;
        let len = self.energy_history.len();
        if len == 0 {
            return 0.0;
        }
        let take = window.min(len);
        let sum: f32 = self.energy_history.iter().rev().take(take).sum();
        sum / take as f32
    }

    fn accept_beat(&mut self, timestamp_ms: f64) {
        self.last_beat_ms = Some(timestamp_ms);
        self.beat_count += 1;

        self.beat_history.push_back(timestamp_ms);
        if self.beat_history.len() > self.config.beat_history {
            self.beat_history.pop_front();
        }

        // Fewer than 4 samples: keep the last-known BPM, complexity falls
        // back to the insufficient-data default
        if self.beat_history.len() < 4 {
            self.rhythm_complexity = Self::DEFAULT_COMPLEXITY;
            self.confidence = 0.1 * self.beat_history.len() as f32;
            return;
        }

        let intervals: Vec<f64> = self
            .beat_history
            .iter()
            .zip(self.beat_history.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect();

        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean_interval > 0.0 {
            let instant_bpm = (60_000.0 / mean_interval) as f32;
            let blended = self.current_bpm * self.config.bpm_blend
                + instant_bpm * (1.0 - self.config.bpm_blend);
            self.current_bpm = blended.clamp(self.config.bpm_min, self.config.bpm_max);
        }

        let variance = intervals
            .iter()
            .map(|&i| {
                let d = i - mean_interval;
                d * d
            })
            .sum::<f64>()
            / intervals.len() as f64;

        self.rhythm_complexity =
            ((variance as f32) / self.config.complexity_scale).clamp(0.0, 1.0);

        // Confidence rises with history fill and falls with interval spread
        let fill = self.beat_history.len() as f32 / self.config.beat_history as f32;
        let cv = if mean_interval > 0.0 {
            (variance.sqrt() / mean_interval) as f32
        } else {
            1.0
        };
        self.confidence = ((1.0 - cv).clamp(0.0, 1.0) * fill).clamp(0.0, 1.0);
    }

    /// Snapshot for the coherence engine.
    pub fn snapshot(&self) -> BeatSnapshot {
        BeatSnapshot {
            bpm: self.current_bpm,
            last_beat_ms: self.last_beat_ms,
            beat_count: self.beat_count,
            confidence: self.confidence,
            rhythm_complexity: self.rhythm_complexity,
        }
    }

    /// Reset all tracking state.
    pub fn reset(&mut self) {
        self.energy_history.clear();
        self.beat_history.clear();
        self.current_bpm = 120.0;
        self.last_beat_ms = None;
        self.beat_count = 0;
        self.confidence = 0.0;
        self.rhythm_complexity = Self::DEFAULT_COMPLEXITY;
    }
}
