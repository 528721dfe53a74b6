//! Pausable simulation clock driven by a wall-time source.
//!
//! Simulated time advances only while the clock is running and unpaused:
//!
//!   now = (accumulated + (wall_now - resumed_at)) * speed
//!
//! The clock itself does no locking.  Callers share it behind the
//! simulator's state mutex, which is what makes pause/resume safe.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{CoreError, CoreResult, SimTime};

// ── Wall sources ──────────────────────────────────────────────────────────────

/// Monotonic wall-time source.
pub trait WallSource: Send + Sync {
    /// Wall time elapsed since an arbitrary fixed origin.
    fn elapsed(&self) -> Duration;
}

/// Real monotonic time, measured from construction.
#[derive(Debug)]
pub struct SystemWall {
    origin: Instant,
}

impl SystemWall {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemWall {
    fn default() -> Self {
        Self::new()
    }
}

impl WallSource for SystemWall {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Wall time that moves only when told to.  Used for deterministic runs.
#[derive(Debug, Default)]
pub struct ManualWall {
    nanos: AtomicU64,
}

impl ManualWall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saturates at `u64::MAX` nanoseconds.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(by)));
    }

    /// Advance by `secs` wall seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX));
    }
}

impl WallSource for ManualWall {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ── ClockStatus ───────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClockStatus {
    NotStarted,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for ClockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClockStatus::NotStarted => "not-started",
            ClockStatus::Running => "running",
            ClockStatus::Paused => "paused",
            ClockStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// ── SimClock ──────────────────────────────────────────────────────────────────

pub struct SimClock {
    /// Simulated time units per wall second.
    speed: f64,
    wall: Arc<dyn WallSource>,
    /// Wall time accumulated over all finished running segments.
    accumulated: Duration,
    /// Wall reading at the start of the current running segment.
    resumed_at: Option<Duration>,
    status: ClockStatus,
}

impl SimClock {
    /// Clock backed by the system monotonic clock.
    pub fn new(speed: f64) -> CoreResult<Self> {
        Self::with_wall(speed, Arc::new(SystemWall::new()))
    }

    pub fn with_wall(speed: f64, wall: Arc<dyn WallSource>) -> CoreResult<Self> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(CoreError::InvalidSpeed(speed));
        }
        Ok(Self {
            speed,
            wall,
            accumulated: Duration::ZERO,
            resumed_at: None,
            status: ClockStatus::NotStarted,
        })
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[inline]
    pub fn status(&self) -> ClockStatus {
        self.status
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.status == ClockStatus::Paused
    }

    /// `true` while started and not stopped, paused or not.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.status, ClockStatus::Running | ClockStatus::Paused)
    }

    /// Begin advancing time from zero.
    pub fn start(&mut self) -> CoreResult<()> {
        if self.status != ClockStatus::NotStarted {
            return Err(CoreError::ClockAlreadyStarted);
        }
        self.resumed_at = Some(self.wall.elapsed());
        self.status = ClockStatus::Running;
        info!(speed = self.speed, "clock started");
        Ok(())
    }

    /// Freeze the clock for good.  Idempotent.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }
        self.fold_segment();
        self.status = ClockStatus::Stopped;
        info!(now = self.now().0, "clock stopped");
    }

    /// Stop advancing time.  Returns `false` (and does nothing) unless running.
    pub fn pause(&mut self) -> bool {
        if self.status != ClockStatus::Running {
            return false;
        }
        self.fold_segment();
        self.status = ClockStatus::Paused;
        debug!(now = self.now().0, "clock paused");
        true
    }

    /// Resume advancing time.  Returns `false` (and does nothing) unless paused.
    pub fn resume(&mut self) -> bool {
        if self.status != ClockStatus::Paused {
            return false;
        }
        self.resumed_at = Some(self.wall.elapsed());
        self.status = ClockStatus::Running;
        debug!(now = self.now().0, "clock resumed");
        true
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        let mut wall = self.accumulated;
        if let Some(since) = self.resumed_at {
            wall = wall.saturating_add(self.wall.elapsed().saturating_sub(since));
        }
        SimTime(wall.as_secs_f64() * self.speed)
    }

    /// Snap the accumulator so that `now()` reads `t`.
    ///
    /// Fails for non-finite `t` and for times whose wall equivalent does
    /// not fit in a `Duration`.
    ///
    /// No history check happens here; see the simulator's validated
    /// adjustment for that.
    pub fn set_now(&mut self, t: SimTime) -> CoreResult<()> {
        if !t.is_finite() {
            return Err(CoreError::InvalidTime(t.0));
        }
        self.accumulated = Duration::try_from_secs_f64(t.0.max(0.0) / self.speed)
            .map_err(|_| CoreError::InvalidTime(t.0))?;
        if self.resumed_at.is_some() {
            self.resumed_at = Some(self.wall.elapsed());
        }
        Ok(())
    }

    /// Convert a wall duration in seconds into simulated units.
    #[inline]
    pub fn wall_to_sim(&self, wall_secs: f64) -> f64 {
        wall_secs * self.speed
    }

    /// Convert simulated units into wall seconds.
    #[inline]
    pub fn sim_to_wall(&self, sim: f64) -> f64 {
        sim / self.speed
    }

    fn fold_segment(&mut self) {
        if let Some(since) = self.resumed_at.take() {
            self.accumulated += self.wall.elapsed().saturating_sub(since);
        }
    }
}

impl fmt::Debug for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimClock")
            .field("speed", &self.speed)
            .field("status", &self.status)
            .field("now", &self.now())
            .finish()
    }
}
