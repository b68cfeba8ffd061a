//! Procedural event generation
//!
//! Turns band energies crossing adaptive thresholds into discrete spawn
//! events with quadrant assignment, difficulty scaling, and a guaranteed
//! telegraph lead time. Difficulty follows the player's recent hit/miss
//! record; the telegraph window never shrinks below the configured floor no
//! matter how hard the multiplier pushes.

use crate::bands::{BandId, BandMap};
use crate::beat::BeatObservation;
use crate::coherence::CoherenceState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// 4D geometry families the visualizer can spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    /// The 4D sphere
    Hypersphere,
    /// The 8-cell
    Tesseract,
    /// The 24-cell
    Cell24,
    /// The 600-cell
    Cell600,
    /// The 120-cell
    Cell120,
}

impl GeometryKind {
    /// Integer index in the external visualizer's geometry table (0..=8).
    pub fn index(self) -> u8 {
        match self {
            GeometryKind::Hypersphere => 0,
            GeometryKind::Tesseract => 1,
            GeometryKind::Cell24 => 2,
            GeometryKind::Cell600 => 3,
            GeometryKind::Cell120 => 4,
        }
    }
}

/// How the player is expected to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Press in time with the beat
    Pulse,
    /// Single tap
    Tap,
    /// Press and hold
    Hold,
    /// Directional swipe
    Swipe,
    /// Stay away from the region
    Avoid,
}

/// Why an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A band crossed its adaptive threshold
    Band(BandId),
    /// Beat-synchronized burst on a strong onset
    Burst,
    /// Sustained rising energy
    BuildUp,
    /// Near-silence breather
    Calm,
}

/// Resolution of a consumed event, reported back by the interaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Player responded in the window
    Hit,
    /// Player missed the window
    Miss,
}

/// A discrete spawn instruction. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEvent {
    /// Monotonically increasing identifier
    pub id: u64,
    /// Why this event exists
    pub kind: EventKind,
    /// Geometry to spawn
    pub geometry: GeometryKind,
    /// Expected player response
    pub interaction: InteractionKind,
    /// Spatial region: 1-4 are quadrants, 0 is center/all
    pub quadrant: u8,
    /// Band energy at emission time
    pub energy: f32,
    /// When the geometry appears, in clock milliseconds
    pub spawn_at_ms: f64,
    /// Difficulty scalar attached to the event
    pub difficulty: f32,
    /// Advance-warning window; never below the configured floor
    pub telegraph_ms: f64,
}

/// Per-band spawn rule: where the event goes and when, relative to tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandAction {
    /// Source band
    pub band: BandId,
    /// Geometry spawned for this band
    pub geometry: GeometryKind,
    /// Interaction demanded
    pub interaction: InteractionKind,
    /// Target quadrant (0 = center)
    pub quadrant: u8,
    /// Spawn delay as a fraction of one beat
    pub subdivision_beats: f32,
    /// Base energy threshold before difficulty scaling
    pub threshold: f32,
}

/// Event generator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Multiplicative difficulty step per adaptation tick
    #[serde(default = "default_difficulty_step")]
    pub difficulty_step: f32,
    /// Accuracy above which difficulty ramps up
    #[serde(default = "default_accuracy_high")]
    pub accuracy_high: f32,
    /// Accuracy below which difficulty backs off
    #[serde(default = "default_accuracy_low")]
    pub accuracy_low: f32,
    /// Difficulty multiplier floor
    #[serde(default = "default_difficulty_min")]
    pub difficulty_min: f32,
    /// Difficulty multiplier ceiling
    #[serde(default = "default_difficulty_max")]
    pub difficulty_max: f32,
    /// How many resolved events feed the accuracy window
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,
    /// Fairness floor: no event telegraphs for less than this
    #[serde(default = "default_min_telegraph_ms")]
    pub min_telegraph_ms: f64,
    /// Telegraph length before difficulty shortens it toward the floor
    #[serde(default = "default_base_telegraph_ms")]
    pub base_telegraph_ms: f64,
    /// Beat strength that qualifies as a burst onset
    #[serde(default = "default_burst_strength")]
    pub burst_strength: f32,
    /// Sustained total energy qualifying as a build-up
    #[serde(default = "default_buildup_level")]
    pub buildup_level: f32,
    /// Ticks of history examined for the energy trend
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Total energy under which the scene counts as calm
    #[serde(default = "default_calm_level")]
    pub calm_level: f32,
    /// Minimum spacing between consecutive special events of one kind
    #[serde(default = "default_special_cooldown_ms")]
    pub special_cooldown_ms: f64,
    /// Per-band spawn rules (kept last so the TOML form serializes cleanly)
    #[serde(default = "default_actions")]
    pub actions: Vec<BandAction>,
}

fn default_actions() -> Vec<BandAction> {
    vec![
        BandAction {
            band: BandId::Bass,
            geometry: GeometryKind::Hypersphere,
            interaction: InteractionKind::Pulse,
            quadrant: 3,
            subdivision_beats: 1.0,
            threshold: 0.20,
        },
        BandAction {
            band: BandId::LowMid,
            geometry: GeometryKind::Tesseract,
            interaction: InteractionKind::Tap,
            quadrant: 1,
            subdivision_beats: 0.5,
            threshold: 0.18,
        },
        BandAction {
            band: BandId::Mid,
            geometry: GeometryKind::Cell24,
            interaction: InteractionKind::Hold,
            quadrant: 2,
            subdivision_beats: 0.25,
            threshold: 0.15,
        },
        BandAction {
            band: BandId::HighMid,
            geometry: GeometryKind::Cell600,
            interaction: InteractionKind::Swipe,
            quadrant: 4,
            subdivision_beats: 0.75,
            threshold: 0.12,
        },
        BandAction {
            band: BandId::Treble,
            geometry: GeometryKind::Cell120,
            interaction: InteractionKind::Avoid,
            quadrant: 0,
            subdivision_beats: 2.0,
            threshold: 0.10,
        },
    ]
}

fn default_difficulty_step() -> f32 {
    0.05
}
fn default_accuracy_high() -> f32 {
    0.8
}
fn default_accuracy_low() -> f32 {
    0.5
}
fn default_difficulty_min() -> f32 {
    0.5
}
fn default_difficulty_max() -> f32 {
    3.0
}
fn default_outcome_window() -> usize {
    10
}
fn default_min_telegraph_ms() -> f64 {
    3000.0
}
fn default_base_telegraph_ms() -> f64 {
    4500.0
}
fn default_burst_strength() -> f32 {
    0.5
}
fn default_buildup_level() -> f32 {
    0.7
}
fn default_trend_window() -> usize {
    20
}
fn default_calm_level() -> f32 {
    0.1
}
fn default_special_cooldown_ms() -> f64 {
    2000.0
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            actions: default_actions(),
            difficulty_step: default_difficulty_step(),
            accuracy_high: default_accuracy_high(),
            accuracy_low: default_accuracy_low(),
            difficulty_min: default_difficulty_min(),
            difficulty_max: default_difficulty_max(),
            outcome_window: default_outcome_window(),
            min_telegraph_ms: default_min_telegraph_ms(),
            base_telegraph_ms: default_base_telegraph_ms(),
            burst_strength: default_burst_strength(),
            buildup_level: default_buildup_level(),
            trend_window: default_trend_window(),
            calm_level: default_calm_level(),
            special_cooldown_ms: default_special_cooldown_ms(),
        }
    }
}

/// Adaptive-threshold spawn event generator.
pub struct EventGenerator {
    config: EventConfig,
    difficulty: f32,
    outcomes: VecDeque<EventOutcome>,
    next_id: u64,
    /// Pending events ordered by spawn time
    queue: Vec<SpawnEvent>,
    /// Per-band spawn gates: band -> earliest next spawn time
    band_gates: HashMap<BandId, f64>,
    /// Total-energy history feeding the trend detector
    energy_trend: VecDeque<f32>,
    last_burst_ms: f64,
    last_buildup_ms: f64,
    last_calm_ms: f64,
}

impl EventGenerator {
    /// Create a generator at neutral difficulty.
    pub fn new(config: EventConfig) -> Self {
        Self {
            config,
            difficulty: 1.0,
            outcomes: VecDeque::new(),
            next_id: 0,
            queue: Vec::new(),
            band_gates: HashMap::new(),
            energy_trend: VecDeque::new(),
            last_burst_ms: f64::NEG_INFINITY,
            last_buildup_ms: f64::NEG_INFINITY,
            last_calm_ms: f64::NEG_INFINITY,
        }
    }

    /// Current difficulty multiplier.
    pub fn difficulty(&self) -> f32 {
        self.difficulty
    }

    /// Pending events not yet due.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Observe one tick. Emits zero or more events into the internal queue
    /// and returns how many were added.
    pub fn observe(
        &mut self,
        bands: &BandMap,
        coherence: &CoherenceState,
        beat: &BeatObservation,
        now_ms: f64,
    ) -> usize {
        self.adapt_difficulty();

        let beat_interval_ms = 60_000.0 / coherence.tempo.bpm.max(1.0) as f64;
        let mut added = 0;

        // Per-band threshold crossings
        for action in self.config.actions.clone() {
            let energy = bands.energy(action.band);
            // Harder play lowers the bar, spawning more
            let threshold = action.threshold / self.difficulty;
            if energy <= threshold {
                continue;
            }

            let gate = self
                .band_gates
                .get(&action.band)
                .copied()
                .unwrap_or(f64::NEG_INFINITY);
            if now_ms < gate {
                continue;
            }

            let spawn_delay = action.subdivision_beats as f64 * beat_interval_ms;
            let event = self.make_event(
                EventKind::Band(action.band),
                action.geometry,
                action.interaction,
                action.quadrant,
                energy,
                now_ms + spawn_delay,
            );
            self.enqueue(event);
            self.band_gates.insert(action.band, now_ms + spawn_delay);
            added += 1;
        }

        // Energy trend for the special aggregate events
        self.energy_trend.push_back(coherence.energy.total);
        if self.energy_trend.len() > self.config.trend_window {
            self.energy_trend.pop_front();
        }

        added += self.observe_specials(coherence, beat, now_ms, beat_interval_ms);
        added
    }

    fn observe_specials(
        &mut self,
        coherence: &CoherenceState,
        beat: &BeatObservation,
        now_ms: f64,
        beat_interval_ms: f64,
    ) -> usize {
        let mut added = 0;
        let cooldown = self.config.special_cooldown_ms;

        // Beat-synchronized burst on a strong onset: spawns on the next beat
        if beat.beat_detected
            && beat.strength >= self.config.burst_strength
            && now_ms - self.last_burst_ms >= cooldown
        {
            let to_next_beat = (1.0 - coherence.tempo.beat_phase as f64) * beat_interval_ms;
            let event = self.make_event(
                EventKind::Burst,
                GeometryKind::Hypersphere,
                InteractionKind::Pulse,
                0,
                coherence.energy.total,
                now_ms + to_next_beat,
            );
            self.enqueue(event);
            self.last_burst_ms = now_ms;
            added += 1;
        }

        // Build-up: trend window full, rising, and sustained above the level
        if self.energy_trend.len() >= self.config.trend_window
            && now_ms - self.last_buildup_ms >= cooldown
        {
            let half = self.energy_trend.len() / 2;
            let early: f32 =
                self.energy_trend.iter().take(half).sum::<f32>() / half.max(1) as f32;
            let late: f32 = self.energy_trend.iter().skip(half).sum::<f32>()
                / (self.energy_trend.len() - half).max(1) as f32;

            if late > early && late > self.config.buildup_level {
                let event = self.make_event(
                    EventKind::BuildUp,
                    GeometryKind::Cell600,
                    InteractionKind::Swipe,
                    0,
                    late,
                    now_ms + beat_interval_ms,
                );
                self.enqueue(event);
                self.last_buildup_ms = now_ms;
                added += 1;
            }
        }

        // Calm: near-silence breather
        if coherence.energy.total < self.config.calm_level
            && now_ms - self.last_calm_ms >= cooldown
        {
            let event = self.make_event(
                EventKind::Calm,
                GeometryKind::Cell120,
                InteractionKind::Avoid,
                0,
                coherence.energy.total,
                now_ms + 2.0 * beat_interval_ms,
            );
            self.enqueue(event);
            self.last_calm_ms = now_ms;
            added += 1;
        }

        added
    }

    fn make_event(
        &mut self,
        kind: EventKind,
        geometry: GeometryKind,
        interaction: InteractionKind,
        quadrant: u8,
        energy: f32,
        spawn_at_ms: f64,
    ) -> SpawnEvent {
        let id = self.next_id;
        self.next_id += 1;

        // The fairness floor is absolute: difficulty shortens the telegraph
        // only down to the configured minimum
        let telegraph_ms = (self.config.base_telegraph_ms / self.difficulty as f64)
            .max(self.config.min_telegraph_ms);

        trace!(
            "Spawn event #{} {:?} q{} at {:.0} ms (telegraph {:.0} ms)",
            id,
            kind,
            quadrant,
            spawn_at_ms,
            telegraph_ms
        );

        SpawnEvent {
            id,
            kind,
            geometry,
            interaction,
            quadrant,
            energy,
            spawn_at_ms,
            difficulty: self.difficulty,
            telegraph_ms,
        }
    }

    fn enqueue(&mut self, event: SpawnEvent) {
        // Keep the queue ordered by spawn time
        let idx = self
            .queue
            .partition_point(|e| e.spawn_at_ms <= event.spawn_at_ms);
        self.queue.insert(idx, event);
    }

    /// Dequeue every event whose spawn time has arrived, in spawn-time
    /// order. Each event is handed out exactly once.
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<SpawnEvent> {
        let split = self.queue.partition_point(|e| e.spawn_at_ms <= now_ms);
        self.queue.drain(..split).collect()
    }

    /// Report the resolution of a consumed event. Feeds the difficulty
    /// adaptation window.
    pub fn record_outcome(&mut self, outcome: EventOutcome) {
        self.outcomes.push_back(outcome);
        if self.outcomes.len() > self.config.outcome_window {
            self.outcomes.pop_front();
        }
    }

    fn adapt_difficulty(&mut self) {
        if self.outcomes.len() < self.config.outcome_window {
            return;
        }
        let hits = self
            .outcomes
            .iter()
            .filter(|o| **o == EventOutcome::Hit)
            .count();
        let accuracy = hits as f32 / self.outcomes.len() as f32;

        let step = self.config.difficulty_step;
        let before = self.difficulty;
        if accuracy > self.config.accuracy_high {
            self.difficulty *= 1.0 + step;
        } else if accuracy < self.config.accuracy_low {
            self.difficulty *= 1.0 - step;
        }
        self.difficulty = self
            .difficulty
            .clamp(self.config.difficulty_min, self.config.difficulty_max);

        if (self.difficulty - before).abs() > f32::EPSILON {
            debug!(
                "Difficulty {:.2} -> {:.2} (accuracy {:.2})",
                before, self.difficulty, accuracy
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::bands::{BandAnalyzer, BandTable};
    use crate::beat::BeatSnapshot;
    use crate::coherence::{CoherenceConfig, CoherenceEngine};

    fn frame_with_band(min_bin: usize, max_bin: usize, db: f32, t: f64) -> AudioFrame {
        let mut spectrum = vec![-100.0f32; 1024];
        for bin in spectrum.iter_mut().take(max_bin).skip(min_bin) {
            *bin = db;
        }
        AudioFrame::new(t, 44100, spectrum, vec![], -100.0).unwrap()
    }

    fn observe_once(gen: &mut EventGenerator, frame: &AudioFrame, now_ms: f64) -> usize {
        let analyzer = BandAnalyzer::new(BandTable::primary(), -100.0);
        let bands = analyzer.analyze(frame);
        let mut engine = CoherenceEngine::new(CoherenceConfig::default());
        let snap = BeatSnapshot {
            bpm: 120.0,
            last_beat_ms: Some(0.0),
            beat_count: 1,
            confidence: 0.8,
            rhythm_complexity: 0.2,
        };
        let coherence = engine.update(frame, &bands, &snap, now_ms).clone();
        let obs = BeatObservation {
            beat_detected: false,
            strength: 0.0,
            bpm: 120.0,
            confidence: 0.8,
            rhythm_complexity: 0.2,
        };
        gen.observe(&bands, &coherence, &obs, now_ms)
    }

    #[test]
    fn test_loud_bass_spawns_hypersphere_in_q3() {
        let mut gen = EventGenerator::new(EventConfig::default());
        // Bass bins (~43-250 Hz at this resolution)
        let frame = frame_with_band(2, 11, -5.0, 0.0);
        let added = observe_once(&mut gen, &frame, 0.0);
        assert!(added >= 1, "loud bass must spawn at least one event");

        // One full beat later (500 ms at 120 BPM) the event is due
        let events = gen.drain_due(600.0);
        let bass_event = events
            .iter()
            .find(|e| e.kind == EventKind::Band(BandId::Bass))
            .expect("bass event");
        assert_eq!(bass_event.geometry, GeometryKind::Hypersphere);
        assert_eq!(bass_event.interaction, InteractionKind::Pulse);
        assert_eq!(bass_event.quadrant, 3);
    }

    #[test]
    fn test_telegraph_floor_at_difficulty_extremes() {
        for outcome in [EventOutcome::Hit, EventOutcome::Miss] {
            let mut gen = EventGenerator::new(EventConfig::default());
            // Saturate the outcome window so adaptation runs every tick
            for _ in 0..10 {
                gen.record_outcome(outcome);
            }
            // Many adaptation ticks push the multiplier to its bound
            let frame = frame_with_band(2, 11, -5.0, 0.0);
            for tick in 0..200 {
                observe_once(&mut gen, &frame, tick as f64 * 16.0);
            }
            let d = gen.difficulty();
            assert!(
                (d - 3.0).abs() < 1e-3 || (d - 0.5).abs() < 1e-3,
                "difficulty should sit at an extreme, got {}",
                d
            );

            let events = gen.drain_due(f64::INFINITY);
            assert!(!events.is_empty());
            for event in events {
                assert!(
                    event.telegraph_ms >= 3000.0,
                    "telegraph {} below fairness floor at difficulty {}",
                    event.telegraph_ms,
                    event.difficulty
                );
            }
        }
    }

    #[test]
    fn test_difficulty_backs_off_on_misses() {
        let mut gen = EventGenerator::new(EventConfig::default());
        for _ in 0..10 {
            gen.record_outcome(EventOutcome::Miss);
        }
        let frame = frame_with_band(2, 11, -5.0, 0.0);
        for tick in 0..200 {
            observe_once(&mut gen, &frame, tick as f64 * 16.0);
        }
        assert!(
            (gen.difficulty() - 0.5).abs() < 1e-3,
            "difficulty should bottom out at 0.5, got {}",
            gen.difficulty()
        );
    }

    #[test]
    fn test_queue_is_spawn_time_ordered() {
        let mut gen = EventGenerator::new(EventConfig::default());
        // All bands loud: different subdivisions produce different spawn
        // times from the same tick
        let frame = frame_with_band(0, 400, -5.0, 0.0);
        observe_once(&mut gen, &frame, 0.0);
        assert!(gen.pending() >= 3);

        let events = gen.drain_due(f64::INFINITY);
        for pair in events.windows(2) {
            assert!(
                pair[0].spawn_at_ms <= pair[1].spawn_at_ms,
                "queue not in spawn-time order"
            );
        }
    }

    #[test]
    fn test_events_consumed_exactly_once() {
        let mut gen = EventGenerator::new(EventConfig::default());
        let frame = frame_with_band(2, 11, -5.0, 0.0);
        observe_once(&mut gen, &frame, 0.0);

        let first = gen.drain_due(f64::INFINITY);
        assert!(!first.is_empty());
        let second = gen.drain_due(f64::INFINITY);
        assert!(second.is_empty(), "events must dequeue exactly once");
    }

    #[test]
    fn test_silence_emits_only_calm() {
        let mut gen = EventGenerator::new(EventConfig::default());
        let frame = frame_with_band(0, 0, -100.0, 0.0);
        for tick in 0..100 {
            observe_once(&mut gen, &frame, tick as f64 * 16.0);
        }

        let events = gen.drain_due(f64::INFINITY);
        assert!(!events.is_empty(), "calm breathers expected in silence");
        for event in &events {
            assert_eq!(event.kind, EventKind::Calm);
            assert_eq!(event.interaction, InteractionKind::Avoid);
        }
    }

    #[test]
    fn test_band_gate_limits_spawn_rate() {
        let mut gen = EventGenerator::new(EventConfig::default());
        let frame = frame_with_band(2, 11, -5.0, 0.0);
        // Sustained loud bass over ~0.5 s of ticks
        for tick in 0..30 {
            observe_once(&mut gen, &frame, tick as f64 * 16.0);
        }
        let bass_events = gen
            .drain_due(f64::INFINITY)
            .into_iter()
            .filter(|e| e.kind == EventKind::Band(BandId::Bass))
            .count();
        // One per beat interval (500 ms), so at most 1-2 over 480 ms
        assert!(
            bass_events <= 2,
            "sustained bass spawned {} events in half a second",
            bass_events
        );
    }
}
