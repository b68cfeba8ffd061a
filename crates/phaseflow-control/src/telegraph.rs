//! Telegraph lifecycle
//!
//! Tracks each consumed spawn event from the start of its advance warning
//! through the interaction window to resolution, enforcing the minimum
//! warning time and feeding two loops upstream: hit/miss outcomes for the
//! difficulty adaptation and expected-vs-actual timing errors for the
//! latency compensator.

use phaseflow_core::events::{EventOutcome, SpawnEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Telegraph scheduler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegraphConfig {
    /// Fairness floor on the warning window; events arriving with less are
    /// clamped up, never down
    #[serde(default = "default_min_telegraph_ms")]
    pub min_telegraph_ms: f64,
    /// How long the interaction window stays open after the telegraph ends
    #[serde(default = "default_hit_window_ms")]
    pub hit_window_ms: f64,
}

fn default_min_telegraph_ms() -> f64 {
    3000.0
}
fn default_hit_window_ms() -> f64 {
    500.0
}

impl Default for TelegraphConfig {
    fn default() -> Self {
        Self {
            min_telegraph_ms: default_min_telegraph_ms(),
            hit_window_ms: default_hit_window_ms(),
        }
    }
}

/// A telegraph currently on screen.
#[derive(Debug, Clone)]
pub struct ActiveTelegraph {
    /// The event being telegraphed
    pub event: SpawnEvent,
    /// Warning window actually used (post floor clamp)
    pub telegraph_ms: f64,
}

impl ActiveTelegraph {
    /// When the warning ends and the interaction window opens.
    pub fn interaction_at_ms(&self) -> f64 {
        self.event.spawn_at_ms + self.telegraph_ms
    }

    /// Warning progress in [0, 1] at `now_ms`.
    pub fn progress(&self, now_ms: f64) -> f32 {
        (((now_ms - self.event.spawn_at_ms) / self.telegraph_ms).clamp(0.0, 1.0)) as f32
    }
}

/// A resolved telegraph, reported to the feedback loops.
#[derive(Debug, Clone)]
pub struct TelegraphOutcome {
    /// Id of the resolved event
    pub event_id: u64,
    /// Hit or miss
    pub outcome: EventOutcome,
    /// For hits: when the interaction was expected
    pub expected_ms: f64,
    /// For hits: when the interaction landed; equals `expected_ms` +
    /// whatever the player's timing error was. Misses report the window end.
    pub actual_ms: f64,
}

/// Consumes due spawn events and runs their telegraph lifecycle.
#[derive(Default)]
pub struct TelegraphScheduler {
    config: TelegraphConfig,
    active: Vec<ActiveTelegraph>,
    resolved: Vec<TelegraphOutcome>,
}

impl TelegraphScheduler {
    /// Create a scheduler.
    pub fn new(config: TelegraphConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Take ownership of freshly-due events. Each event enters exactly one
    /// telegraph; a warning window below the fairness floor is clamped up
    /// and logged, since no event may show less than the minimum warning.
    ///
    /// Rejects the whole batch if any event names a quadrant outside 0..=4.
    pub fn ingest(&mut self, events: &[SpawnEvent]) -> crate::Result<()> {
        if let Some(bad) = events.iter().find(|e| e.quadrant > 4) {
            return Err(crate::ControlError::InvalidQuadrant(bad.quadrant));
        }
        for event in events {
            let telegraph_ms = if event.telegraph_ms < self.config.min_telegraph_ms {
                warn!(
                    "Event #{} arrived with a {:.0} ms telegraph; clamping to the {:.0} ms floor",
                    event.id, event.telegraph_ms, self.config.min_telegraph_ms
                );
                self.config.min_telegraph_ms
            } else {
                event.telegraph_ms
            };
            self.active.push(ActiveTelegraph {
                event: event.clone(),
                telegraph_ms,
            });
        }
        Ok(())
    }

    /// Telegraphs currently running.
    pub fn active(&self) -> &[ActiveTelegraph] {
        &self.active
    }

    /// Register a player interaction in `quadrant` at `now_ms`. Matches the
    /// earliest active telegraph in that quadrant whose interaction window
    /// is open; returns the outcome record when one matched.
    pub fn register_input(&mut self, quadrant: u8, now_ms: f64) -> Option<TelegraphOutcome> {
        let idx = self
            .active
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.event.quadrant == quadrant
                    && now_ms >= t.interaction_at_ms()
                    && now_ms <= t.interaction_at_ms() + self.config.hit_window_ms
            })
            .min_by(|(_, a), (_, b)| {
                a.interaction_at_ms().total_cmp(&b.interaction_at_ms())
            })
            .map(|(i, _)| i)?;

        let telegraph = self.active.remove(idx);
        let expected = telegraph.interaction_at_ms();
        let outcome = TelegraphOutcome {
            event_id: telegraph.event.id,
            outcome: EventOutcome::Hit,
            expected_ms: expected,
            actual_ms: now_ms,
        };
        debug!(
            "Hit on event #{} ({:+.0} ms off the mark)",
            outcome.event_id,
            now_ms - expected
        );
        self.resolved.push(outcome.clone());
        Some(outcome)
    }

    /// Expire telegraphs whose interaction window closed without input.
    /// Returns the misses resolved this call.
    pub fn update(&mut self, now_ms: f64) -> Vec<TelegraphOutcome> {
        let hit_window = self.config.hit_window_ms;
        let mut misses = Vec::new();

        self.active.retain(|t| {
            let deadline = t.interaction_at_ms() + hit_window;
            if now_ms > deadline {
                misses.push(TelegraphOutcome {
                    event_id: t.event.id,
                    outcome: EventOutcome::Miss,
                    expected_ms: t.interaction_at_ms(),
                    actual_ms: deadline,
                });
                false
            } else {
                true
            }
        });

        for miss in &misses {
            debug!("Event #{} expired unanswered", miss.event_id);
        }
        self.resolved.extend(misses.iter().cloned());
        misses
    }

    /// Drain the full resolution history (hits and misses, in resolution
    /// order).
    pub fn drain_resolved(&mut self) -> Vec<TelegraphOutcome> {
        std::mem::take(&mut self.resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phaseflow_core::events::{EventKind, GeometryKind, InteractionKind};
    use phaseflow_core::BandId;

    fn event(id: u64, quadrant: u8, spawn_at_ms: f64, telegraph_ms: f64) -> SpawnEvent {
        SpawnEvent {
            id,
            kind: EventKind::Band(BandId::Bass),
            geometry: GeometryKind::Hypersphere,
            interaction: InteractionKind::Pulse,
            quadrant,
            energy: 0.5,
            spawn_at_ms,
            difficulty: 1.0,
            telegraph_ms,
        }
    }

    #[test]
    fn test_progress_over_warning_window() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 3, 1000.0, 4000.0)]).unwrap();

        let t = &sched.active()[0];
        assert_eq!(t.progress(1000.0), 0.0);
        assert!((t.progress(3000.0) - 0.5).abs() < 1e-6);
        assert_eq!(t.progress(5000.0), 1.0);
        assert_eq!(t.progress(9000.0), 1.0);
    }

    #[test]
    fn test_invalid_quadrant_rejected() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        let result = sched.ingest(&[event(1, 7, 0.0, 3000.0)]);
        assert!(result.is_err());
        assert!(sched.active().is_empty());
    }

    #[test]
    fn test_short_telegraph_clamped_to_floor() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 3, 0.0, 1200.0)]).unwrap();

        assert_eq!(sched.active()[0].telegraph_ms, 3000.0);
    }

    #[test]
    fn test_hit_inside_window() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 3, 0.0, 3000.0)]).unwrap();

        // Too early: the warning is still running
        assert!(sched.register_input(3, 2000.0).is_none());
        // Wrong quadrant
        assert!(sched.register_input(1, 3100.0).is_none());

        // On time, right quadrant
        let outcome = sched.register_input(3, 3120.0).expect("hit");
        assert_eq!(outcome.outcome, EventOutcome::Hit);
        assert_eq!(outcome.expected_ms, 3000.0);
        assert_eq!(outcome.actual_ms, 3120.0);
        assert!(sched.active().is_empty());
    }

    #[test]
    fn test_miss_after_window_closes() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 2, 0.0, 3000.0)]).unwrap();

        assert!(sched.update(3400.0).is_empty(), "window still open");
        let misses = sched.update(3600.0);
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].outcome, EventOutcome::Miss);
        assert!(sched.active().is_empty());
    }

    #[test]
    fn test_earliest_telegraph_wins_the_input() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 3, 0.0, 3000.0), event(2, 3, 200.0, 3000.0)]).unwrap();

        // Both windows open at 3300; the earlier interaction time matches
        let outcome = sched.register_input(3, 3300.0).expect("hit");
        assert_eq!(outcome.event_id, 1);
        assert_eq!(sched.active().len(), 1);
    }

    #[test]
    fn test_resolution_history_drains_once() {
        let mut sched = TelegraphScheduler::new(TelegraphConfig::default());
        sched.ingest(&[event(1, 3, 0.0, 3000.0)]).unwrap();
        sched.register_input(3, 3100.0);

        assert_eq!(sched.drain_resolved().len(), 1);
        assert!(sched.drain_resolved().is_empty());
    }
}
