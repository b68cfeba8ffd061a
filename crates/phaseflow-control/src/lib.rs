//! PhaseFlow Control - Effect Coordinators
//!
//! Independent renderers and schedulers that consume the shared coherence
//! state and the spawn-event stream: the particle field, the telegraph
//! lifecycle, and the haptic engine. All three derive their motion from the
//! same state the geometry visualizer reads, which is what keeps the layers
//! visually and temporally coherent.

#![warn(missing_docs)]

use thiserror::Error;

pub mod haptics;
pub mod particles;
pub mod telegraph;

pub use haptics::{HapticConfig, HapticEngine, NullVibration, VibrationSink};
pub use particles::{Particle, ParticleConfig, ParticleField};
pub use telegraph::{ActiveTelegraph, TelegraphConfig, TelegraphOutcome, TelegraphScheduler};

/// Control-layer error types
#[derive(Error, Debug)]
pub enum ControlError {
    /// An event referenced a quadrant outside 0..=4
    #[error("Invalid quadrant {0} (valid: 0-4)")]
    InvalidQuadrant(u8),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;

/// Center position of a quadrant in normalized [-1, 1] screen space.
/// Quadrant 0 is center/all.
pub fn quadrant_center(quadrant: u8) -> glam::Vec2 {
    match quadrant {
        1 => glam::Vec2::new(0.5, 0.5),
        2 => glam::Vec2::new(-0.5, 0.5),
        3 => glam::Vec2::new(-0.5, -0.5),
        4 => glam::Vec2::new(0.5, -0.5),
        _ => glam::Vec2::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrant_centers() {
        assert_eq!(quadrant_center(0), glam::Vec2::ZERO);
        assert_eq!(quadrant_center(3), glam::Vec2::new(-0.5, -0.5));
        // Out-of-range falls back to center rather than panicking
        assert_eq!(quadrant_center(9), glam::Vec2::ZERO);
    }
}
