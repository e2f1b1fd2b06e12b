//! Frame scheduler: delta clamping and throttled subsystem cadences

use tracing::warn;

use crate::util::time::{MAX_FRAME_DELTA, MIN_FRAME_DELTA};

pub const AI_PERIOD: u64 = 3;
pub const PHYSICS_PERIOD: u64 = 2;
pub const CONDITIONS_PERIOD: u64 = 30;
pub const DEBUG_PERIOD: u64 = 30;
pub const UI_PERIOD: u64 = 10;
pub const CLEANUP_PERIOD: u64 = 60;
pub const NETWORK_PERIOD: u64 = 6;
/// Frames between FPS samples
pub const PERFORMANCE_SAMPLE_PERIOD: u64 = 60;

const LOW_FPS: f64 = 20.0;
const RECOVERED_FPS: f64 = 45.0;

/// What runs this frame. Throttled steps carry their compensated delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub frame: u64,
    /// Clamped frame delta in seconds
    pub dt: f64,
    /// Enemy AI, retargeting and spawn evaluation (`dt * 3`)
    pub ai_dt: Option<f64>,
    /// Collision resolution and static body updates (`dt * 2`)
    pub physics_dt: Option<f64>,
    pub check_conditions: bool,
    pub debug_snapshot: bool,
    pub refresh_ui: bool,
    pub cleanup: bool,
    pub network_sync: bool,
    pub render: bool,
}

fn due(frame: u64, period: u64) -> bool {
    frame % period == 0
}

#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    last_frame_time: Option<f64>,
    pub frame_counter: u64,
    pub performance_mode: bool,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan the frame at `now` (seconds on a monotonic clock).
    ///
    /// Returns `None` when the raw delta is under the 1 ms floor; the frame is
    /// skipped without touching the counter. The very first call has a zero
    /// delta and is always skipped.
    pub fn begin_frame(&mut self, now: f64) -> Option<FramePlan> {
        let last = self.last_frame_time.unwrap_or(now);
        self.last_frame_time = Some(now);

        let raw = now - last;
        if raw < MIN_FRAME_DELTA {
            return None;
        }
        let dt = raw.min(MAX_FRAME_DELTA);

        self.frame_counter += 1;
        let frame = self.frame_counter;

        if due(frame, PERFORMANCE_SAMPLE_PERIOD) {
            self.sample_performance(dt);
        }

        Some(FramePlan {
            frame,
            dt,
            ai_dt: due(frame, AI_PERIOD).then_some(dt * AI_PERIOD as f64),
            physics_dt: due(frame, PHYSICS_PERIOD).then_some(dt * PHYSICS_PERIOD as f64),
            check_conditions: due(frame, CONDITIONS_PERIOD),
            debug_snapshot: due(frame, DEBUG_PERIOD),
            refresh_ui: due(frame, UI_PERIOD),
            cleanup: due(frame, CLEANUP_PERIOD),
            network_sync: due(frame, NETWORK_PERIOD),
            render: !self.performance_mode || frame % 2 == 0,
        })
    }

    fn sample_performance(&mut self, dt: f64) {
        let fps = 1.0 / dt;
        if fps < LOW_FPS {
            if !self.performance_mode {
                warn!(fps = %format!("{fps:.1}"), "Low frame rate, entering performance mode");
            }
            self.performance_mode = true;
        } else if fps > RECOVERED_FPS && self.performance_mode {
            warn!(fps = %format!("{fps:.1}"), "Frame rate recovered, leaving performance mode");
            self.performance_mode = false;
        }
    }

    /// Forget the last timestamp so the next frame starts fresh (after a pause)
    pub fn reset_clock(&mut self) {
        self.last_frame_time = None;
    }
}
