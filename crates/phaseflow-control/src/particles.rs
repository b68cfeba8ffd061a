//! Particle field
//!
//! A lightweight particle system driven entirely by the shared coherence
//! state: bursts on beats, drift from the 4D rotation angles, hue from the
//! spectral centroid. It performs no audio analysis of its own, which is
//! exactly why it can never desynchronize from the geometry layer.

use crate::quadrant_center;
use glam::Vec2;
use phaseflow_core::sink::hue_from_centroid;
use phaseflow_core::CoherenceState;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

/// Particle system tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Hard cap on live particles
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,
    /// Particles spawned per beat burst at full strength
    #[serde(default = "default_burst_count")]
    pub burst_count: usize,
    /// Particle lifetime
    #[serde(default = "default_lifetime_ms")]
    pub lifetime_ms: f64,
    /// Velocity damping per second
    #[serde(default = "default_drag")]
    pub drag: f32,
    /// RNG seed for spawn jitter
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_particles() -> usize {
    512
}
fn default_burst_count() -> usize {
    24
}
fn default_lifetime_ms() -> f64 {
    1800.0
}
fn default_drag() -> f32 {
    0.8
}
fn default_seed() -> u64 {
    7
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            max_particles: default_max_particles(),
            burst_count: default_burst_count(),
            lifetime_ms: default_lifetime_ms(),
            drag: default_drag(),
            seed: default_seed(),
        }
    }
}

/// One live particle in normalized [-1, 1] screen space.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    /// Position
    pub position: Vec2,
    /// Velocity in units per second
    pub velocity: Vec2,
    /// Color hue in [0, 1], shared mapping with the visualizer
    pub hue: f32,
    /// Remaining lifetime
    pub life_ms: f64,
    /// Render size scalar
    pub size: f32,
}

/// Coherence-driven particle coordinator.
pub struct ParticleField {
    config: ParticleConfig,
    particles: Vec<Particle>,
    rng: StdRng,
}

impl ParticleField {
    /// Create an empty field.
    pub fn new(config: ParticleConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            particles: Vec::with_capacity(config.max_particles),
            config,
        }
    }

    /// Live particles, for the renderer.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advance one tick. `beat_strength` is nonzero on ticks where a beat
    /// was detected; `quadrant` steers where the burst appears (0 = center).
    pub fn update(
        &mut self,
        state: &CoherenceState,
        beat_strength: f32,
        quadrant: u8,
        dt_ms: f64,
    ) {
        let dt = (dt_ms / 1000.0) as f32;

        // Age and advect
        let drag = self.config.drag.powf(dt);
        let swirl = state.rotation.xw + state.rotation.yw + state.rotation.zw;
        for p in &mut self.particles {
            p.life_ms -= dt_ms;
            // The same rotation state the geometry layer reads bends the
            // particle paths, so both layers turn together
            let turn = Vec2::new(-p.position.y, p.position.x) * swirl * 0.1;
            p.velocity = (p.velocity + turn * dt) * drag;
            p.position += p.velocity * dt;
            p.size = 0.5 + state.energy.total * 0.5;
        }
        self.particles.retain(|p| p.life_ms > 0.0);

        // Beat burst
        if beat_strength > 0.0 {
            self.spawn_burst(state, beat_strength, quadrant);
        }
    }

    fn spawn_burst(&mut self, state: &CoherenceState, strength: f32, quadrant: u8) {
        let count = ((self.config.burst_count as f32) * strength.clamp(0.0, 1.0)).ceil() as usize;
        let origin = quadrant_center(quadrant);
        let hue = hue_from_centroid(state.frequency.centroid_hz) as f32;

        for _ in 0..count {
            if self.particles.len() >= self.config.max_particles {
                break;
            }
            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            let speed = 0.2 + self.rng.random::<f32>() * 0.6 * (0.5 + state.energy.bass);
            self.particles.push(Particle {
                position: origin,
                velocity: Vec2::from_angle(angle) * speed,
                hue,
                life_ms: self.config.lifetime_ms,
                size: 0.5 + state.energy.total * 0.5,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phaseflow_core::coherence::{EnergyState, SpectralState};

    fn state_with_energy(total: f32) -> CoherenceState {
        CoherenceState {
            energy: EnergyState {
                bass: total / 3.0,
                mid: total / 3.0,
                treble: total / 3.0,
                total,
            },
            frequency: SpectralState {
                fundamental_hz: 220.0,
                centroid_hz: 800.0,
                bandwidth_hz: 300.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_burst_on_beat() {
        let mut field = ParticleField::new(ParticleConfig::default());
        let state = state_with_energy(1.5);

        field.update(&state, 0.0, 0, 16.0);
        assert!(field.particles().is_empty(), "no burst without a beat");

        field.update(&state, 1.0, 3, 16.0);
        assert!(!field.particles().is_empty());
        for p in field.particles() {
            assert_eq!(p.position, quadrant_center(3));
            assert!(p.hue >= 0.0 && p.hue <= 1.0);
        }
    }

    #[test]
    fn test_particles_expire() {
        let config = ParticleConfig {
            lifetime_ms: 100.0,
            ..Default::default()
        };
        let mut field = ParticleField::new(config);
        let state = state_with_energy(1.0);

        field.update(&state, 1.0, 0, 16.0);
        let alive = field.particles().len();
        assert!(alive > 0);

        // Run past the lifetime with no further beats
        for _ in 0..10 {
            field.update(&state, 0.0, 0, 16.0);
        }
        assert!(field.particles().is_empty());
    }

    #[test]
    fn test_particle_cap_holds() {
        let config = ParticleConfig {
            max_particles: 50,
            burst_count: 40,
            ..Default::default()
        };
        let mut field = ParticleField::new(config);
        let state = state_with_energy(2.0);

        for _ in 0..5 {
            field.update(&state, 1.0, 0, 16.0);
        }
        assert!(field.particles().len() <= 50);
    }

    #[test]
    fn test_particles_move_between_ticks() {
        let mut field = ParticleField::new(ParticleConfig::default());
        let state = state_with_energy(1.0);

        field.update(&state, 1.0, 1, 16.0);
        let before: Vec<Vec2> = field.particles().iter().map(|p| p.position).collect();
        field.update(&state, 0.0, 0, 16.0);

        let moved = field
            .particles()
            .iter()
            .zip(before.iter())
            .any(|(p, b)| p.position != *b);
        assert!(moved, "particles should advect between ticks");
    }
}
