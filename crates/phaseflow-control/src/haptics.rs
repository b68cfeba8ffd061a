//! Haptic patterns
//!
//! Turns beats and spawn events into vibration patterns: arrays of
//! millisecond durations, alternating vibrate/pause, handed to a
//! fire-and-forget sink. On devices with no vibration support the sink is a
//! no-op and the rest of the system never notices.

use phaseflow_core::events::{InteractionKind, SpawnEvent};
use phaseflow_core::CoherenceState;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Haptic engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapticConfig {
    /// Base pulse length at full beat strength
    #[serde(default = "default_beat_pulse_ms")]
    pub beat_pulse_ms: u64,
    /// Minimum beat strength that produces any feedback
    #[serde(default = "default_min_strength")]
    pub min_strength: f32,
    /// Longest single vibration the engine will request
    #[serde(default = "default_max_pulse_ms")]
    pub max_pulse_ms: u64,
}

fn default_beat_pulse_ms() -> u64 {
    50
}
fn default_min_strength() -> f32 {
    0.1
}
fn default_max_pulse_ms() -> u64 {
    400
}

impl Default for HapticConfig {
    fn default() -> Self {
        Self {
            beat_pulse_ms: default_beat_pulse_ms(),
            min_strength: default_min_strength(),
            max_pulse_ms: default_max_pulse_ms(),
        }
    }
}

/// Fire-and-forget vibration device. `pattern` alternates vibrate and pause
/// durations in milliseconds, starting with a vibration.
pub trait VibrationSink: Send {
    /// Request a pattern. Implementations must not block the tick loop.
    fn vibrate(&mut self, pattern: &[u64]);
}

/// No-op sink for devices without vibration support.
#[derive(Debug, Default)]
pub struct NullVibration;

impl VibrationSink for NullVibration {
    fn vibrate(&mut self, _pattern: &[u64]) {}
}

/// Maps beats and events to vibration patterns.
pub struct HapticEngine {
    config: HapticConfig,
}

impl HapticEngine {
    /// Create an engine.
    pub fn new(config: HapticConfig) -> Self {
        Self { config }
    }

    /// Pulse on a detected beat, scaled by strength and bass energy from
    /// the shared state.
    pub fn on_beat(
        &self,
        state: &CoherenceState,
        strength: f32,
        sink: &mut dyn VibrationSink,
    ) {
        if strength < self.config.min_strength {
            return;
        }
        let scale = (strength.clamp(0.0, 1.0) * (0.5 + state.energy.bass * 0.5)) as f64;
        let pulse = ((self.config.beat_pulse_ms as f64 * (0.5 + scale)) as u64)
            .min(self.config.max_pulse_ms);

        trace!("Haptic beat pulse {} ms", pulse);
        sink.vibrate(&[pulse]);
    }

    /// Signature pattern for a spawn event's interaction kind.
    pub fn on_event(&self, event: &SpawnEvent, sink: &mut dyn VibrationSink) {
        let unit = self.config.beat_pulse_ms;
        let pattern: Vec<u64> = match event.interaction {
            // Single firm pulse
            InteractionKind::Pulse => vec![unit * 2],
            // Two quick taps
            InteractionKind::Tap => vec![unit, unit, unit],
            // One long sustain
            InteractionKind::Hold => vec![(unit * 6).min(self.config.max_pulse_ms)],
            // Rising triple
            InteractionKind::Swipe => vec![unit / 2, unit / 2, unit, unit / 2, unit * 2],
            // Warning stutter
            InteractionKind::Avoid => vec![unit / 2, unit / 2, unit / 2, unit / 2, unit / 2],
        };

        let clamped: Vec<u64> = pattern
            .into_iter()
            .map(|d| d.min(self.config.max_pulse_ms))
            .collect();

        trace!("Haptic event #{} pattern {:?}", event.id, clamped);
        sink.vibrate(&clamped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phaseflow_core::events::{EventKind, GeometryKind};
    use phaseflow_core::BandId;

    struct RecordingSink(Vec<Vec<u64>>);
    impl VibrationSink for RecordingSink {
        fn vibrate(&mut self, pattern: &[u64]) {
            self.0.push(pattern.to_vec());
        }
    }

    fn event_with(interaction: InteractionKind) -> SpawnEvent {
        SpawnEvent {
            id: 1,
            kind: EventKind::Band(BandId::Bass),
            geometry: GeometryKind::Hypersphere,
            interaction,
            quadrant: 3,
            energy: 0.5,
            spawn_at_ms: 0.0,
            difficulty: 1.0,
            telegraph_ms: 3000.0,
        }
    }

    #[test]
    fn test_weak_beats_stay_silent() {
        let engine = HapticEngine::new(HapticConfig::default());
        let mut sink = RecordingSink(Vec::new());

        engine.on_beat(&CoherenceState::default(), 0.05, &mut sink);
        assert!(sink.0.is_empty());

        engine.on_beat(&CoherenceState::default(), 0.8, &mut sink);
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn test_patterns_start_with_vibration_and_respect_cap() {
        let engine = HapticEngine::new(HapticConfig::default());
        let mut sink = RecordingSink(Vec::new());

        for interaction in [
            InteractionKind::Pulse,
            InteractionKind::Tap,
            InteractionKind::Hold,
            InteractionKind::Swipe,
            InteractionKind::Avoid,
        ] {
            engine.on_event(&event_with(interaction), &mut sink);
        }

        assert_eq!(sink.0.len(), 5);
        for pattern in &sink.0 {
            assert!(!pattern.is_empty());
            assert!(pattern.iter().all(|&d| d <= 400));
        }
    }

    #[test]
    fn test_distinct_interactions_feel_different() {
        let engine = HapticEngine::new(HapticConfig::default());
        let mut sink = RecordingSink(Vec::new());

        engine.on_event(&event_with(InteractionKind::Tap), &mut sink);
        engine.on_event(&event_with(InteractionKind::Hold), &mut sink);
        assert_ne!(sink.0[0], sink.0[1]);
    }

    #[test]
    fn test_null_sink_is_harmless() {
        let engine = HapticEngine::new(HapticConfig::default());
        let mut sink = NullVibration;
        engine.on_beat(&CoherenceState::default(), 1.0, &mut sink);
        engine.on_event(&event_with(InteractionKind::Pulse), &mut sink);
    }
}
