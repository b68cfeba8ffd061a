//! Monotonic clock abstraction
//!
//! All timing inside the analysis core goes through [`Clock`] so the whole
//! pipeline can be replayed deterministically in tests. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_ms(&self) -> f64;
}

/// Wall-clock backed [`Clock`], anchored at construction time.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually-advanced clock for tests and replay.
pub struct ManualClock {
    now_ms: Mutex<f64>,
}

impl ManualClock {
    /// Create a manual clock starting at 0 ms.
    pub fn new() -> Self {
        Self {
            now_ms: Mutex::new(0.0),
        }
    }

    /// Create a manual clock starting at `start_ms`.
    pub fn starting_at(start_ms: f64) -> Self {
        Self {
            now_ms: Mutex::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance(&self, delta_ms: f64) {
        *self.now_ms.lock() += delta_ms;
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, ms: f64) {
        *self.now_ms.lock() = ms;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now_ms.lock()
    }
}

/// Shared clock handle used across the pipeline and scheduler.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0.0);

        clock.advance(16.6);
        clock.advance(16.6);
        assert!((clock.now_ms() - 33.2).abs() < 1e-9);

        clock.set(1000.0);
        assert_eq!(clock.now_ms(), 1000.0);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
