//! Unified coherence engine
//!
//! The single source of truth all visual and haptic layers read from. Every
//! tick it folds the latest band energies and beat state into one shared
//! mathematical snapshot: beat-locked phases, 4D rotation angles, spectral
//! features, and normalized channel energies. Because every renderer derives
//! its motion from this one state, they cannot drift apart.

use crate::audio::spectrum::db_to_linear;
use crate::audio::AudioFrame;
use crate::bands::{BandId, BandMap};
use crate::beat::BeatSnapshot;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Coherence engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceConfig {
    /// Gain applied to linear band energy before clamping to [0, 1]
    #[serde(default = "default_energy_gain")]
    pub energy_gain: f32,
    /// Scale on the rotation angle amplitudes
    #[serde(default = "default_rotation_gain")]
    pub rotation_gain: f32,
    /// Harmonic phase ratios: octave, fifth, major third
    #[serde(default = "default_harmonic_ratios")]
    pub harmonic_ratios: [f32; 3],
    /// Safe default for spectral features on silent input
    #[serde(default = "default_fallback_hz")]
    pub fallback_hz: f32,
    /// Beats per measure for the measure-phase cycle
    #[serde(default = "default_beats_per_measure")]
    pub beats_per_measure: u32,
}

fn default_energy_gain() -> f32 {
    4.0
}
fn default_rotation_gain() -> f32 {
    2.0
}
fn default_harmonic_ratios() -> [f32; 3] {
    [2.0, 1.5, 1.25]
}
fn default_fallback_hz() -> f32 {
    440.0
}
fn default_beats_per_measure() -> u32 {
    4
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            energy_gain: default_energy_gain(),
            rotation_gain: default_rotation_gain(),
            harmonic_ratios: default_harmonic_ratios(),
            fallback_hz: default_fallback_hz(),
            beats_per_measure: default_beats_per_measure(),
        }
    }
}

/// 4D rotation plane angles, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation4D {
    /// XW plane angle, driven by bass
    pub xw: f32,
    /// YW plane angle, driven by mids
    pub yw: f32,
    /// ZW plane angle, driven by treble
    pub zw: f32,
}

/// Beat-locked phase set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Master sawtooth: 0 at each beat, 2*pi one beat later
    pub master: f32,
    /// Harmonic multiples of the master phase (octave, fifth, major third)
    pub harmonics: [f32; 3],
    /// Disorder estimate in [0, 1]; rises on irregular rhythm
    pub chaos: f32,
}

/// Spectral shape of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralState {
    /// Frequency of the loudest bin
    pub fundamental_hz: f32,
    /// Amplitude-weighted mean frequency
    pub centroid_hz: f32,
    /// Spread around the centroid
    pub bandwidth_hz: f32,
}

impl Default for SpectralState {
    fn default() -> Self {
        Self {
            fundamental_hz: 440.0,
            centroid_hz: 440.0,
            bandwidth_hz: 0.0,
        }
    }
}

/// Normalized channel energies in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    /// Bass channel
    pub bass: f32,
    /// Mid channel
    pub mid: f32,
    /// Treble channel
    pub treble: f32,
    /// Sum of the three channels, in [0, 3]
    pub total: f32,
}

/// Tempo view of the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoState {
    /// Current BPM estimate
    pub bpm: f32,
    /// Progress through the current beat, in [0, 1)
    pub beat_phase: f32,
    /// Progress through the current measure, in [0, 1)
    pub measure_phase: f32,
}

impl Default for TempoState {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beat_phase: 0.0,
            measure_phase: 0.0,
        }
    }
}

/// The shared mathematical snapshot all renderers consume.
///
/// Exclusively written by [`CoherenceEngine::update`] once per tick; every
/// other component holds a read-only view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoherenceState {
    /// 4D rotation plane angles
    pub rotation: Rotation4D,
    /// Beat-locked phases
    pub phase: PhaseState,
    /// Spectral features
    pub frequency: SpectralState,
    /// Normalized channel energies
    pub energy: EnergyState,
    /// Tempo state
    pub tempo: TempoState,
}

/// Sole writer of [`CoherenceState`].
pub struct CoherenceEngine {
    config: CoherenceConfig,
    state: CoherenceState,
}

impl CoherenceEngine {
    /// Create an engine with zeroed/default state.
    pub fn new(config: CoherenceConfig) -> Self {
        Self {
            config,
            state: CoherenceState::default(),
        }
    }

    /// Read the current state.
    pub fn state(&self) -> &CoherenceState {
        &self.state
    }

    /// Fold one tick's inputs into the shared state. Deterministic: time
    /// enters only through `now_ms` and the beat snapshot, never a wall
    /// clock.
    pub fn update(
        &mut self,
        frame: &AudioFrame,
        bands: &BandMap,
        beat: &BeatSnapshot,
        now_ms: f64,
    ) -> &CoherenceState {
        let interval_ms = beat.beat_interval_ms();
        let since_beat_ms = beat.last_beat_ms.map(|t| (now_ms - t).max(0.0)).unwrap_or(0.0);

        // Master phase: sawtooth resetting at each accepted beat, sweeping
        // 0 -> 2*pi over one beat period
        let beat_progress = (since_beat_ms / interval_ms) as f32;
        let master = TAU * beat_progress;
        let r = self.config.harmonic_ratios;
        let harmonics = [master * r[0], master * r[1], master * r[2]];

        // Normalized channel energies
        let norm = |e: f32| (e * self.config.energy_gain).clamp(0.0, 1.0);
        let bass = norm(bands.energy(BandId::Bass));
        let mid = norm(bands.energy(BandId::Mid));
        let treble = norm(bands.energy(BandId::Treble));

        // The asymmetric phase multipliers keep the three planes from
        // rotating in lockstep
        let g = self.config.rotation_gain;
        let rotation = Rotation4D {
            xw: master.sin() * bass * g,
            yw: (master * 1.5).cos() * mid * g,
            zw: (master * 0.7).sin() * treble * g,
        };

        let frequency = self.spectral_features(frame);

        let chaos = (beat.rhythm_complexity * (1.0 - beat.confidence)).clamp(0.0, 1.0);

        let beat_phase = beat_progress.fract();
        let beats_per_measure = self.config.beats_per_measure.max(1);
        let beats_into_measure = (beat.beat_count % beats_per_measure as u64) as f32;
        let measure_phase =
            ((beats_into_measure + beat_phase) / beats_per_measure as f32).fract();

        self.state = CoherenceState {
            rotation,
            phase: PhaseState {
                master,
                harmonics,
                chaos,
            },
            frequency,
            energy: EnergyState {
                bass,
                mid,
                treble,
                total: bass + mid + treble,
            },
            tempo: TempoState {
                bpm: beat.bpm,
                beat_phase,
                measure_phase,
            },
        };

        &self.state
    }

    /// Spectral centroid, bandwidth, and fundamental over the full spectrum.
    ///
    /// Silence makes the centroid denominator zero; the previous valid value
    /// is kept in that case (the configured fallback before any valid frame
    /// ever arrived), so NaN can never reach a consumer.
    fn spectral_features(&self, frame: &AudioFrame) -> SpectralState {
        let bin_hz = frame.bin_hz();

        let mut weighted = 0.0f64;
        let mut total = 0.0f64;
        let mut loudest_bin = 0usize;
        let mut loudest_db = f32::NEG_INFINITY;

        for (i, &db) in frame.frequency_db.iter().enumerate() {
            let mag = db_to_linear(db) as f64;
            weighted += i as f64 * bin_hz as f64 * mag;
            total += mag;
            if db > loudest_db {
                loudest_db = db;
                loudest_bin = i;
            }
        }

        // Silence guard: a floor-level spectrum still has a tiny positive
        // total, so gate on meaningful energy instead of exact zero
        let silence_gate = frame.frequency_db.len() as f64 * 2e-5;
        if total <= silence_gate {
            return self.state.frequency;
        }

        let centroid_hz = (weighted / total) as f32;

        let mut spread = 0.0f64;
        for (i, &db) in frame.frequency_db.iter().enumerate() {
            let mag = db_to_linear(db) as f64;
            let d = i as f64 * bin_hz as f64 - centroid_hz as f64;
            spread += d * d * mag;
        }
        let bandwidth_hz = (spread / total).sqrt() as f32;

        let fundamental_hz = (loudest_bin as f32 * bin_hz).max(bin_hz);

        SpectralState {
            fundamental_hz,
            centroid_hz,
            bandwidth_hz,
        }
    }
}
