//! Parameter sink adapter
//!
//! Translates the coherence state and freshly-due spawn events into the
//! external visualizer's named parameter set. Pure range scaling and
//! clamping, with epsilon change-detection so the sink only hears about
//! parameters that actually moved.
//!
//! Output contract (names and ranges are fixed):
//!
//! | parameter      | range            | source                                 |
//! |----------------|------------------|----------------------------------------|
//! | `rot4dXW`      | [-2pi, 2pi] rad  | rotation.xw                            |
//! | `rot4dYW`      | [-2pi, 2pi] rad  | rotation.yw                            |
//! | `rot4dZW`      | [-2pi, 2pi] rad  | rotation.zw                            |
//! | `gridDensity`  | [5, 100]         | total energy, normalized               |
//! | `morphFactor`  | [0, 1]           | beat phase                             |
//! | `chaos`        | [0, 1]           | phase.chaos                            |
//! | `hue`          | [0, 1]           | spectral centroid, log-mapped          |
//! | `intensity`    | [0, 1]           | total energy / 3                       |
//! | `saturation`   | [0, 1]           | inverse chaos                          |
//! | `speed`        | [0, 3]           | BPM, linear from the clamp range       |
//! | `geometry`     | integer [0, 8]   | geometry of the latest due event       |

use crate::coherence::CoherenceState;
use crate::events::SpawnEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;

/// Change-detection tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Minimum delta before a parameter update is forwarded
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_epsilon() -> f64 {
    1e-3
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

/// Receiver of named parameter updates. The adapter is the sole writer;
/// consumers hold an injected handle, never a global.
pub trait ParameterSink {
    /// One changed parameter. Called once per parameter per tick at most.
    fn update(&mut self, name: &'static str, value: f64);
}

/// Range-scaling adapter with per-parameter change detection.
pub struct ParameterMapper {
    config: SinkConfig,
    last_sent: HashMap<&'static str, f64>,
    last_geometry: u8,
}

impl ParameterMapper {
    /// Create a mapper with nothing sent yet.
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            last_sent: HashMap::new(),
            last_geometry: 0,
        }
    }

    /// Map one tick's state to the sink. `due_events` are the events that
    /// became due this tick (they steer the `geometry` parameter).
    pub fn apply(
        &mut self,
        state: &CoherenceState,
        due_events: &[SpawnEvent],
        sink: &mut dyn ParameterSink,
    ) {
        if let Some(event) = due_events.last() {
            self.last_geometry = event.geometry.index().min(8);
        }

        let rot_clamp = |v: f32| (v as f64).clamp(-TAU, TAU);
        let unit = |v: f32| (v as f64).clamp(0.0, 1.0);

        let density_norm = unit(state.energy.total / 3.0);
        let hue = hue_from_centroid(state.frequency.centroid_hz);
        let speed = ((state.tempo.bpm - 60.0) / 140.0).clamp(0.0, 1.0) as f64 * 3.0;

        self.send(sink, "rot4dXW", rot_clamp(state.rotation.xw));
        self.send(sink, "rot4dYW", rot_clamp(state.rotation.yw));
        self.send(sink, "rot4dZW", rot_clamp(state.rotation.zw));
        self.send(sink, "gridDensity", 5.0 + density_norm * 95.0);
        self.send(sink, "morphFactor", unit(state.tempo.beat_phase));
        self.send(sink, "chaos", unit(state.phase.chaos));
        self.send(sink, "hue", hue);
        self.send(sink, "intensity", unit(state.energy.total / 3.0));
        self.send(sink, "saturation", unit(1.0 - state.phase.chaos * 0.5));
        self.send(sink, "speed", speed);
        self.send(sink, "geometry", self.last_geometry as f64);
    }

    fn send(&mut self, sink: &mut dyn ParameterSink, name: &'static str, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        match self.last_sent.get(name) {
            Some(&prev) if (prev - value).abs() <= self.config.epsilon => {}
            _ => {
                self.last_sent.insert(name, value);
                sink.update(name, value);
            }
        }
    }
}

/// Log-scale mapping of the audible spectrum (20 Hz - 20 kHz) onto [0, 1].
///
/// Shared by every consumer that colors output from the spectral centroid,
/// so all layers agree on hue for the same state.
pub fn hue_from_centroid(centroid_hz: f32) -> f64 {
    let hz = centroid_hz.clamp(20.0, 20_000.0) as f64;
    ((hz / 20.0).ln() / (1000.0f64).ln()).clamp(0.0, 1.0)
}

/// In-memory sink recording every forwarded update. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Every update in arrival order
    pub updates: Vec<(&'static str, f64)>,
    /// Latest value per parameter
    pub values: HashMap<&'static str, f64>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value of a parameter, if it was ever forwarded.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

impl ParameterSink for MemorySink {
    fn update(&mut self, name: &'static str, value: f64) {
        self.updates.push((name, value));
        self.values.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherence::{EnergyState, PhaseState, Rotation4D, SpectralState, TempoState};

    fn test_state() -> CoherenceState {
        CoherenceState {
            rotation: Rotation4D {
                xw: 1.0,
                yw: -0.5,
                zw: 8.0, // deliberately out of range
            },
            phase: PhaseState {
                master: 3.0,
                harmonics: [6.0, 4.5, 3.75],
                chaos: 0.25,
            },
            frequency: SpectralState {
                fundamental_hz: 220.0,
                centroid_hz: 2000.0,
                bandwidth_hz: 500.0,
            },
            energy: EnergyState {
                bass: 0.8,
                mid: 0.4,
                treble: 0.2,
                total: 1.4,
            },
            tempo: TempoState {
                bpm: 130.0,
                beat_phase: 0.6,
                measure_phase: 0.15,
            },
        }
    }

    #[test]
    fn test_ranges_are_respected() {
        let mut mapper = ParameterMapper::new(SinkConfig::default());
        let mut sink = MemorySink::new();
        mapper.apply(&test_state(), &[], &mut sink);

        let zw = sink.get("rot4dZW").unwrap();
        assert!(zw <= TAU, "rotation must clamp to 2*pi, got {}", zw);

        let density = sink.get("gridDensity").unwrap();
        assert!((5.0..=100.0).contains(&density));

        for name in ["morphFactor", "chaos", "hue", "intensity", "saturation"] {
            let v = sink.get(name).unwrap();
            assert!((0.0..=1.0).contains(&v), "{} out of range: {}", name, v);
        }

        let speed = sink.get("speed").unwrap();
        assert!((0.0..=3.0).contains(&speed));
        // 130 BPM inside [60, 200] maps to (130-60)/140 * 3 = 1.5
        assert!((speed - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_change_detection_suppresses_identical_updates() {
        let mut mapper = ParameterMapper::new(SinkConfig::default());
        let mut sink = MemorySink::new();
        let state = test_state();

        mapper.apply(&state, &[], &mut sink);
        let first_count = sink.updates.len();
        assert!(first_count > 0);

        // Same state again: nothing moved, nothing forwarded
        mapper.apply(&state, &[], &mut sink);
        assert_eq!(
            sink.updates.len(),
            first_count,
            "unchanged parameters must not be re-sent"
        );
    }

    #[test]
    fn test_small_wiggle_below_epsilon_is_suppressed() {
        let mut mapper = ParameterMapper::new(SinkConfig { epsilon: 0.01 });
        let mut sink = MemorySink::new();
        let mut state = test_state();

        mapper.apply(&state, &[], &mut sink);
        let count = sink.updates.len();

        state.energy.total += 0.0001; // far below epsilon after scaling
        state.rotation.xw += 0.001;
        mapper.apply(&state, &[], &mut sink);
        assert_eq!(sink.updates.len(), count);
    }

    #[test]
    fn test_geometry_follows_latest_due_event() {
        use crate::events::{EventKind, GeometryKind, InteractionKind, SpawnEvent};
        let mut mapper = ParameterMapper::new(SinkConfig::default());
        let mut sink = MemorySink::new();

        let event = SpawnEvent {
            id: 7,
            kind: EventKind::Burst,
            geometry: GeometryKind::Cell600,
            interaction: InteractionKind::Swipe,
            quadrant: 0,
            energy: 0.5,
            spawn_at_ms: 0.0,
            difficulty: 1.0,
            telegraph_ms: 3000.0,
        };
        mapper.apply(&test_state(), &[event], &mut sink);

        assert_eq!(sink.get("geometry").unwrap(), 3.0);
    }

    #[test]
    fn test_non_finite_values_never_reach_sink() {
        let mut mapper = ParameterMapper::new(SinkConfig::default());
        let mut sink = MemorySink::new();
        let mut state = test_state();
        state.rotation.xw = f32::NAN;
        state.frequency.centroid_hz = f32::INFINITY;

        mapper.apply(&state, &[], &mut sink);
        for (name, value) in &sink.updates {
            assert!(value.is_finite(), "{} forwarded non-finite value", name);
        }
    }
}
