//! Frame Pacing
//!
//! Throttles frame delivery to the virtual camera's configured frame rate.
//! After each frame is handed to the sink, [`FramePacer::sleep_until_next_frame`]
//! blocks until the next frame is due. When the rate is unknown the pacer
//! never blocks and frames go out as fast as the source produces them.
//!
//! The clock is injectable so pacing can be checked without real sleeps.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Time source used by [`FramePacer`]
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock
///
/// `sleep` advances the clock instead of blocking. Clones share the same
/// timeline, so a test can keep one handle and give another to the pacer.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Rc<Cell<Duration>>,
    sleeps: Rc<Cell<u32>>,
}

impl ManualClock {
    /// Create a clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
            sleeps: Rc::new(Cell::new(0)),
        }
    }

    /// Move time forward without counting a sleep
    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Number of times `sleep` was called
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

/// Fixed-rate frame pacer
#[derive(Debug)]
pub struct FramePacer<C: Clock = SystemClock> {
    clock: C,
    /// Interval between frames (None = unpaced)
    interval: Option<Duration>,
    /// Instant the previous frame was released
    last_release: Option<Instant>,
}

impl FramePacer<SystemClock> {
    /// Create a pacer on the wall clock
    ///
    /// A non-positive `fps` disables pacing.
    pub fn new(fps: i32) -> Self {
        Self::with_clock(fps, SystemClock)
    }
}

impl<C: Clock> FramePacer<C> {
    /// Create a pacer on a custom clock
    pub fn with_clock(fps: i32, clock: C) -> Self {
        let interval = if fps > 0 {
            Some(Duration::from_secs_f64(1.0 / fps as f64))
        } else {
            None
        };

        Self {
            clock,
            interval,
            last_release: None,
        }
    }

    /// Interval between frames, if paced
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Block until the next frame is due
    ///
    /// Called right after a frame is handed over. The first call waits one
    /// full interval from now. If the caller is already past the deadline the
    /// pacer does not sleep and re-anchors on the current instant instead of
    /// bursting to catch up.
    pub fn sleep_until_next_frame(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };

        let now = self.clock.now();
        let deadline = self.last_release.unwrap_or(now) + interval;

        if deadline > now {
            let wait = deadline - now;
            trace!("Pacing: sleeping {:?}", wait);
            self.clock.sleep(wait);
            self.last_release = Some(deadline);
        } else {
            trace!("Pacing: frame late by {:?}", now - deadline);
            self.last_release = Some(now);
        }
    }
}
