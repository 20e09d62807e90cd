use std::time::{Duration, Instant};

/// One tick of the [`FrameClock`].
#[derive(Clone, Copy, Debug)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    pub now: Instant,
    pub frame: u64,
}

/// Measures time between frames.
///
/// The delta is clamped so a frame after a long stall (app in background,
/// debugger break) does not advance animations by seconds at once.
#[derive(Clone, Debug)]
pub struct FrameClock {
    last: Instant,
    frame: u64,
    min_dt: Duration,
    max_dt: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_limits(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_limits(min_dt: Duration, max_dt: Duration) -> Self {
        debug_assert!(min_dt <= max_dt);
        Self {
            last: Instant::now(),
            frame: 0,
            min_dt,
            max_dt,
        }
    }

    /// Restarts the baseline, e.g. when returning to the foreground.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.min_dt, self.max_dt);
        self.last = now;
        let time = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame: self.frame,
        };
        self.frame = self.frame.wrapping_add(1);
        time
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

const FPS_WINDOW: usize = 64;

/// Paces frames to a target rate and tracks the achieved rate.
#[derive(Clone, Debug)]
pub struct FrameRater {
    target: Option<Duration>,
    frame_start: Option<Instant>,
    samples: [f32; FPS_WINDOW],
    next: usize,
    filled: usize,
}

impl FrameRater {
    /// `target_fps` of 0 disables pacing.
    pub fn new(target_fps: u32) -> Self {
        Self {
            target: (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(target_fps))),
            frame_start: None,
            samples: [0.0; FPS_WINDOW],
            next: 0,
            filled: 0,
        }
    }

    pub fn target(&self) -> Option<Duration> {
        self.target
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Marks the beginning of a frame and records the previous frame's length.
    pub fn start_at(&mut self, now: Instant) {
        if let Some(prev) = self.frame_start {
            let secs = now.saturating_duration_since(prev).as_secs_f32();
            if secs > 0.0 {
                self.samples[self.next] = secs;
                self.next = (self.next + 1) % FPS_WINDOW;
                self.filled = (self.filled + 1).min(FPS_WINDOW);
            }
        }
        self.frame_start = Some(now);
    }

    /// Time left in the current frame's budget.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match (self.target, self.frame_start) {
            (Some(target), Some(start)) => target.saturating_sub(now.saturating_duration_since(start)),
            _ => Duration::ZERO,
        }
    }

    /// Sleeps until the frame budget is used up.
    pub fn wait(&self) {
        let remaining = self.remaining_at(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    /// Average frames per second over recent frames.
    pub fn fps(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        let total: f32 = self.samples[..self.filled].iter().sum();
        self.filled as f32 / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_clamps_long_stalls() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let stalled = clock.tick_at(t0 + Duration::from_secs(5));
        assert!((stalled.dt - 0.25).abs() < 1e-6);
        assert_eq!(stalled.frame, 1);
        let same = clock.tick_at(t0 + Duration::from_secs(5));
        assert!(same.dt > 0.0);
    }

    #[test]
    fn rater_reports_remaining_budget() {
        let mut rater = FrameRater::new(50);
        let t0 = Instant::now();
        rater.start_at(t0);
        assert_eq!(rater.remaining_at(t0 + Duration::from_millis(5)), Duration::from_millis(15));
        assert_eq!(rater.remaining_at(t0 + Duration::from_millis(30)), Duration::ZERO);
        assert!(FrameRater::new(0).target().is_none());
    }

    #[test]
    fn rater_averages_fps() {
        let mut rater = FrameRater::new(60);
        let t0 = Instant::now();
        for i in 0..=10 {
            rater.start_at(t0 + Duration::from_millis(20 * i));
        }
        assert!((rater.fps() - 50.0).abs() < 0.5);
    }
}
