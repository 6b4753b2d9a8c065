//! # Frame Timing
//!
//! Measures how long each tick takes, aggregates FPS over a reporting
//! window, and optionally paces ticks to a target rate.
//!
//! Two FPS figures are reported. `fps` is throughput over the window;
//! `mean_fps` is derived from the average frame cost. Jitter in individual
//! frames shows up in the second even when the first looks stable.
//!
//! ```text
//! start() ──[tick body]── end() ──[sleep remaining budget]── start() ...
//!                          │
//!                          └─ count++, frame_times += elapsed
//! ```

use std::thread;
use std::time::{Duration, Instant};

/// Target rate used when a limited frame is asked for 0 FPS.
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// How a frame paces itself after the tick body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePacing {
    /// Measure only, never sleep.
    Unlimited,
    /// Sleep out the remainder of a `1s / target_fps` budget.
    Limited {
        /// Desired frames per second.
        target_fps: u32,
    },
}

/// FPS figures for one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsReport {
    /// Frames completed divided by wall time since the last report.
    pub fps: f64,
    /// Reciprocal of the average per-frame duration.
    pub mean_fps: f64,
    /// Frames completed in the window.
    pub frames: u32,
    /// Longest single frame in the window.
    pub slowest: Duration,
}

/// Per-tick timing accumulator.
///
/// # Example
///
/// ```rust,ignore
/// let mut frame = Frame::limited(120);
/// loop {
///     frame.start();
///     world.update(dt);
///     frame.end(); // sleeps out the rest of the 8.3ms budget
///     if let Some(report) = frame.fps(Duration::from_secs(1)) {
///         tracing::info!("fps: {:.1}", report.fps);
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Frame {
    /// Pacing strategy.
    pacing: FramePacing,
    /// Budget per frame, if limited.
    target_duration: Option<Duration>,
    /// Start of the current frame.
    frame_start: Instant,
    /// Accumulated frame durations since the last report.
    frame_times: Duration,
    /// Frames completed since the last report.
    frame_count: u32,
    /// Longest frame since the last report.
    slowest: Duration,
    /// Time of the last FPS computation.
    last_update: Instant,
}

impl Frame {
    /// Creates a frame with the given pacing.
    #[must_use]
    pub fn new(pacing: FramePacing) -> Self {
        let pacing = match pacing {
            FramePacing::Limited { target_fps: 0 } => FramePacing::Limited {
                target_fps: DEFAULT_TARGET_FPS,
            },
            other => other,
        };
        let target_duration = match pacing {
            FramePacing::Unlimited => None,
            FramePacing::Limited { target_fps } => Some(Duration::from_secs(1) / target_fps),
        };
        let now = Instant::now();

        Self {
            pacing,
            target_duration,
            frame_start: now,
            frame_times: Duration::ZERO,
            frame_count: 0,
            slowest: Duration::ZERO,
            last_update: now,
        }
    }

    /// Creates a measuring frame that never sleeps.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(FramePacing::Unlimited)
    }

    /// Creates a frame paced to `target_fps` (0 means 60).
    #[must_use]
    pub fn limited(target_fps: u32) -> Self {
        Self::new(FramePacing::Limited { target_fps })
    }

    /// Returns the pacing strategy in effect.
    #[inline]
    #[must_use]
    pub const fn pacing(&self) -> FramePacing {
        self.pacing
    }

    /// Returns the per-frame budget, if limited.
    #[inline]
    #[must_use]
    pub const fn target_duration(&self) -> Option<Duration> {
        self.target_duration
    }

    /// Returns frames completed since the last report.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Marks the beginning of a tick.
    #[inline]
    pub fn start(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Marks the end of a tick and returns its cost.
    ///
    /// A limited frame then sleeps for whatever is left of its budget. An
    /// overrun tick does not sleep at all.
    pub fn end(&mut self) -> Duration {
        let elapsed = self.record(self.frame_start.elapsed());
        if let Some(remaining) = self
            .target_duration
            .and_then(|target| remaining_budget(target, elapsed))
        {
            thread::sleep(remaining);
        }
        elapsed
    }

    /// Returns FPS figures once `window` has elapsed since the last report,
    /// then resets the accumulators.
    pub fn fps(&mut self, window: Duration) -> Option<FpsReport> {
        self.fps_at(Instant::now(), window)
    }

    fn record(&mut self, elapsed: Duration) -> Duration {
        self.frame_count = self.frame_count.saturating_add(1);
        self.frame_times += elapsed;
        self.slowest = self.slowest.max(elapsed);
        elapsed
    }

    fn fps_at(&mut self, now: Instant, window: Duration) -> Option<FpsReport> {
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed < window {
            return None;
        }

        let frames = self.frame_count;
        let fps = if elapsed.is_zero() {
            0.0
        } else {
            f64::from(frames) / elapsed.as_secs_f64()
        };
        let mean_fps = if frames == 0 || self.frame_times.is_zero() {
            0.0
        } else {
            1.0 / (self.frame_times.as_secs_f64() / f64::from(frames))
        };
        let report = FpsReport {
            fps,
            mean_fps,
            frames,
            slowest: self.slowest,
        };

        self.frame_count = 0;
        self.frame_times = Duration::ZERO;
        self.slowest = Duration::ZERO;
        self.last_update = now;

        Some(report)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Returns how long to sleep to fill `target`, or `None` if the tick
/// already used the whole budget.
#[inline]
#[must_use]
pub fn remaining_budget(target: Duration, elapsed: Duration) -> Option<Duration> {
    target.checked_sub(elapsed).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_target_duration() {
        let frame = Frame::limited(60);
        assert_eq!(frame.target_duration(), Some(Duration::from_secs(1) / 60));
        assert_eq!(frame.pacing(), FramePacing::Limited { target_fps: 60 });
    }

    #[test]
    fn test_zero_fps_defaults_to_sixty() {
        let frame = Frame::limited(0);
        assert_eq!(frame.pacing(), FramePacing::Limited { target_fps: DEFAULT_TARGET_FPS });
        assert_eq!(frame.target_duration(), Some(Duration::from_secs(1) / 60));
    }

    #[test]
    fn test_unlimited_has_no_budget() {
        assert_eq!(Frame::unlimited().target_duration(), None);
    }

    #[test]
    fn test_remaining_budget_never_negative() {
        let target = Duration::from_millis(16);
        assert_eq!(
            remaining_budget(target, Duration::from_millis(10)),
            Some(Duration::from_millis(6))
        );
        assert_eq!(remaining_budget(target, Duration::from_millis(16)), None);
        assert_eq!(remaining_budget(target, Duration::from_millis(40)), None);
    }

    #[test]
    fn test_overrun_frame_does_not_sleep() {
        let mut frame = Frame::limited(1000);
        frame.start();
        thread::sleep(Duration::from_millis(5));
        let before = Instant::now();
        let elapsed = frame.end();
        assert!(elapsed >= Duration::from_millis(5));
        // Budget was 1ms and already spent: end() returns without sleeping.
        assert!(before.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_limited_frame_fills_budget() {
        let mut frame = Frame::limited(100);
        let start = Instant::now();
        frame.start();
        frame.end();
        assert!(start.elapsed() >= Duration::from_millis(9));
        assert_eq!(frame.frame_count(), 1);
    }

    #[test]
    fn test_fps_not_ready_before_window() {
        let mut frame = Frame::unlimited();
        frame.start();
        frame.end();
        assert!(frame.fps(Duration::from_secs(3600)).is_none());
        assert_eq!(frame.frame_count(), 1);
    }

    #[test]
    fn test_fps_report_and_reset() {
        let mut frame = Frame::unlimited();
        for ms in [2u64, 4, 6, 8] {
            frame.record(Duration::from_millis(ms));
        }
        let later = frame.last_update + Duration::from_secs(2);
        let report = frame.fps_at(later, Duration::from_secs(1)).unwrap();

        assert_eq!(report.frames, 4);
        assert!((report.fps - 2.0).abs() < 1e-9);
        // mean frame = 5ms
        assert!((report.mean_fps - 200.0).abs() < 1e-6);
        assert_eq!(report.slowest, Duration::from_millis(8));

        assert_eq!(frame.frame_count(), 0);
        assert!(frame.fps_at(later, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_fps_with_no_frames() {
        let mut frame = Frame::unlimited();
        let later = frame.last_update + Duration::from_secs(1);
        let report = frame.fps_at(later, Duration::from_secs(1)).unwrap();
        assert_eq!(report.frames, 0);
        assert!(report.fps.abs() < f64::EPSILON);
        assert!(report.mean_fps.abs() < f64::EPSILON);
    }
}
