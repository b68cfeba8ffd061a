//! Latency measurement and adaptive compensation
//!
//! Keeps audio events and their visible/haptic responses aligned: a loopback
//! calibration seeds the device latency profile, then a slow adaptation loop
//! nudges a millisecond offset from the stream of expected-vs-actual timing
//! reports consumers feed back. The offset is hard-clamped so a bad stream
//! of measurements can never walk it off into runaway drift.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Compensator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Fallback input-path latency when calibration fails
    #[serde(default = "default_input_ms")]
    pub default_input_ms: f64,
    /// Fallback output-path latency when calibration fails
    #[serde(default = "default_output_ms")]
    pub default_output_ms: f64,
    /// Fraction of the mean error applied per adaptation step
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Mean error below this is treated as noise, not drift
    #[serde(default = "default_drift_threshold_ms")]
    pub drift_threshold_ms: f64,
    /// Measurements per adaptation window
    #[serde(default = "default_window")]
    pub window: usize,
    /// Hard bound on the adaptive offset, both directions
    #[serde(default = "default_max_offset_ms")]
    pub max_offset_ms: f64,
    /// Spacing of adaptation passes
    #[serde(default = "default_adapt_interval_ms")]
    pub adapt_interval_ms: f64,
    /// Loopback test tone frequency
    #[serde(default = "default_tone_hz")]
    pub tone_hz: f32,
    /// Spectral-bin amplitude that counts as the tone arriving
    #[serde(default = "default_tone_threshold_db")]
    pub tone_threshold_db: f32,
    /// Fixed offset applied in emergency mode
    #[serde(default = "default_emergency_offset_ms")]
    pub emergency_offset_ms: f64,
}

fn default_input_ms() -> f64 {
    20.0
}
fn default_output_ms() -> f64 {
    30.0
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_drift_threshold_ms() -> f64 {
    5.0
}
fn default_window() -> usize {
    10
}
fn default_max_offset_ms() -> f64 {
    300.0
}
fn default_adapt_interval_ms() -> f64 {
    1000.0
}
fn default_tone_hz() -> f32 {
    1000.0
}
fn default_tone_threshold_db() -> f32 {
    -50.0
}
fn default_emergency_offset_ms() -> f64 {
    -60.0
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            default_input_ms: default_input_ms(),
            default_output_ms: default_output_ms(),
            learning_rate: default_learning_rate(),
            drift_threshold_ms: default_drift_threshold_ms(),
            window: default_window(),
            max_offset_ms: default_max_offset_ms(),
            adapt_interval_ms: default_adapt_interval_ms(),
            tone_hz: default_tone_hz(),
            tone_threshold_db: default_tone_threshold_db(),
            emergency_offset_ms: default_emergency_offset_ms(),
        }
    }
}

/// Measured device latency plus the continuously-tuned correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    /// Input (capture) path latency
    pub input_ms: f64,
    /// Output (render) path latency
    pub output_ms: f64,
    /// Round-trip latency
    pub total_ms: f64,
    /// Adaptive correction applied to scheduled timestamps
    pub adaptive_offset_ms: f64,
}

/// Compensator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPhase {
    /// No measurement has run yet
    Uncalibrated,
    /// Loopback measurement in flight
    Calibrating,
    /// Seeded, adaptation not yet engaged
    Calibrated,
    /// Steady state: offset follows the timing-error stream
    Adapting,
    /// Fixed conservative offset, adaptation disabled
    Emergency,
}

/// Performs the loopback measurement: emit a known test tone, report the
/// round-trip until it is detected in the input spectrum. Implemented by the
/// audio layer; tests substitute a scripted probe.
pub trait CalibrationProbe {
    /// Measure round-trip latency in milliseconds, or fail.
    fn measure_round_trip_ms(
        &mut self,
        tone_hz: f32,
        threshold_db: f32,
    ) -> crate::Result<f64>;
}

/// Adaptive latency compensator.
pub struct LatencyCompensator {
    config: LatencyConfig,
    profile: LatencyProfile,
    phase: CalibrationPhase,
    /// Recent timing errors (actual - expected), newest at the back
    errors: VecDeque<f64>,
    /// Mean of the window before the most recent adaptation pass
    prior_window_mean: Option<f64>,
    confidence: f32,
    last_adapt_ms: f64,
}

impl LatencyCompensator {
    /// Create an uncalibrated compensator.
    pub fn new(config: LatencyConfig) -> Self {
        let capacity = config.window * 2;
        Self {
            config,
            profile: LatencyProfile::default(),
            phase: CalibrationPhase::Uncalibrated,
            errors: VecDeque::with_capacity(capacity),
            prior_window_mean: None,
            confidence: 0.0,
            last_adapt_ms: 0.0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Current latency profile.
    pub fn profile(&self) -> LatencyProfile {
        self.profile
    }

    /// Confidence in the current profile, [0, 1].
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Run the loopback calibration. Failure is recovered by seeding the
    /// profile from the platform-default constants with low confidence;
    /// the tick loop can always start.
    pub fn calibrate(&mut self, probe: &mut dyn CalibrationProbe) {
        self.phase = CalibrationPhase::Calibrating;

        match probe.measure_round_trip_ms(self.config.tone_hz, self.config.tone_threshold_db) {
            Ok(round_trip_ms) if round_trip_ms.is_finite() && round_trip_ms >= 0.0 => {
                // Split the round trip between the two paths in the same
                // proportion as the platform defaults
                let default_total = self.config.default_input_ms + self.config.default_output_ms;
                let input_share = self.config.default_input_ms / default_total.max(1e-9);
                self.profile.total_ms = round_trip_ms;
                self.profile.input_ms = round_trip_ms * input_share;
                self.profile.output_ms = round_trip_ms * (1.0 - input_share);
                self.confidence = 0.9;
                info!(
                    "Latency calibrated: {:.1} ms round trip ({:.1} in / {:.1} out)",
                    round_trip_ms, self.profile.input_ms, self.profile.output_ms
                );
            }
            Ok(bad) => {
                warn!("Calibration produced unusable value {bad}; using platform defaults");
                self.seed_defaults();
            }
            Err(e) => {
                warn!("Calibration failed ({e}); using platform defaults");
                self.seed_defaults();
            }
        }

        self.phase = CalibrationPhase::Calibrated;
    }

    fn seed_defaults(&mut self) {
        self.profile.input_ms = self.config.default_input_ms;
        self.profile.output_ms = self.config.default_output_ms;
        self.profile.total_ms = self.config.default_input_ms + self.config.default_output_ms;
        self.confidence = 0.2;
    }

    /// Apply the adaptive correction to a timestamp.
    pub fn compensated_timestamp(&self, t_ms: f64) -> f64 {
        t_ms + self.profile.adaptive_offset_ms
    }

    /// The only write path into the adaptation window. Consumers call this
    /// whenever they can compare an expected event time against when it
    /// actually landed (e.g. input timing against a scheduled telegraph).
    pub fn record_timing_measurement(&mut self, expected_ms: f64, actual_ms: f64) {
        let error = actual_ms - expected_ms;
        if !error.is_finite() {
            return;
        }
        self.errors.push_back(error);
        while self.errors.len() > self.config.window * 2 {
            self.errors.pop_front();
        }
    }

    /// One adaptation pass, rate-limited to the configured interval. Called
    /// from the slow timer, never from the per-frame loop.
    ///
    /// With no fresh measurements the pass silently does nothing and the
    /// offset holds its last value.
    pub fn adapt(&mut self, now_ms: f64) {
        if self.phase == CalibrationPhase::Emergency
            || self.phase == CalibrationPhase::Uncalibrated
        {
            return;
        }
        if now_ms - self.last_adapt_ms < self.config.adapt_interval_ms {
            return;
        }
        self.last_adapt_ms = now_ms;

        if self.errors.len() < self.config.window {
            return;
        }

        let recent_mean = self
            .errors
            .iter()
            .rev()
            .take(self.config.window)
            .sum::<f64>()
            / self.config.window as f64;

        if recent_mean.abs() > self.config.drift_threshold_ms {
            let nudge = recent_mean * self.config.learning_rate;
            let max = self.config.max_offset_ms;
            // Runaway bound: the offset never leaves [-max, max]
            self.profile.adaptive_offset_ms =
                (self.profile.adaptive_offset_ms - nudge).clamp(-max, max);
            self.phase = CalibrationPhase::Adapting;

            debug!(
                "Latency adapt: mean error {:.1} ms, offset now {:.1} ms",
                recent_mean, self.profile.adaptive_offset_ms
            );
        }

        self.prior_window_mean = Some(recent_mean);
    }

    /// Recent-window-vs-prior-window drift, for diagnostics displays.
    pub fn trend_ms(&self) -> f64 {
        let recent = self
            .errors
            .iter()
            .rev()
            .take(self.config.window)
            .sum::<f64>()
            / self.config.window.max(1) as f64;
        match self.prior_window_mean {
            Some(prior) => recent - prior,
            None => 0.0,
        }
    }

    /// Pin a fixed conservative offset and stop adapting. Used when
    /// confidence stays persistently low.
    pub fn enable_emergency_mode(&mut self) {
        warn!(
            "Latency compensator entering emergency mode (fixed {:.0} ms offset)",
            self.config.emergency_offset_ms
        );
        self.profile.adaptive_offset_ms = self.config.emergency_offset_ms;
        self.phase = CalibrationPhase::Emergency;
        self.errors.clear();
    }
}
