//! Time utilities for the frame loop

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Largest delta a single frame may simulate (seconds)
pub const MAX_FRAME_DELTA: f64 = 1.0 / 15.0;

/// Raw deltas below this are treated as noise and the frame is skipped (seconds)
pub const MIN_FRAME_DELTA: f64 = 0.001;

/// Default tick rate of the headless run loop
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Monotonic time source in seconds.
///
/// The scheduler only ever sees time through this trait so tests can drive
/// frames with exact deltas.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// Wall clock anchored at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock, shared by cloning
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_secs)),
        }
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock() = secs;
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.now.lock()
    }
}

/// Duration of one tick at the given rate
pub fn tick_duration(target_fps: u32) -> Duration {
    Duration::from_micros(1_000_000 / target_fps.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(1.0);
        let other = clock.clone();
        other.advance(0.5);
        assert!((clock.now_secs() - 1.5).abs() < 1e-12);
        clock.set(3.0);
        assert!((other.now_secs() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn tick_duration_never_divides_by_zero() {
        assert_eq!(tick_duration(0), Duration::from_secs(1));
        assert_eq!(tick_duration(50), Duration::from_millis(20));
    }
}
