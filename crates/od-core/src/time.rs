//! Simulation time model.
//!
//! # Design
//!
//! Simulation time is a continuous `f64` measured in instance units (the same
//! units as travel times, service times and time windows).  It is wrapped in
//! [`SimTime`] so that it gets a total order: events are kept in ordered
//! collections, and `f64` alone is only `PartialOrd`.  Ordering uses
//! [`f64::total_cmp`], so NaN never silently compares equal to anything.
//!
//! The mapping from wall-clock seconds to simulation time lives in
//! [`SimClock`](crate::SimClock):
//!
//!   sim_time = wall_seconds_while_running * speed

use std::cmp::Ordering;
use std::fmt;

// ── SimTime ───────────────────────────────────────────────────────────────────

/// An absolute point on the simulation time line.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(pub f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    /// Positive infinity.  Used as the "no bound" horizon.
    pub const INFINITY: SimTime = SimTime(f64::INFINITY);

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Later of the two instants.
    #[inline]
    pub fn max(self, other: SimTime) -> SimTime {
        if self >= other { self } else { other }
    }

    /// Earlier of the two instants.
    #[inline]
    pub fn min(self, other: SimTime) -> SimTime {
        if self <= other { self } else { other }
    }

    /// `true` when `self` and `other` differ by at most `tolerance`.
    #[inline]
    pub fn approx_eq(self, other: SimTime, tolerance: f64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::ops::Add<f64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: f64) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl std::ops::Sub<f64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn sub(self, rhs: f64) -> SimTime {
        SimTime(self.0 - rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = f64;
    #[inline]
    fn sub(self, rhs: SimTime) -> f64 {
        self.0 - rhs.0
    }
}

impl From<f64> for SimTime {
    fn from(t: f64) -> Self {
        SimTime(t)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}", self.0)
    }
}

// ── TimeWindow ────────────────────────────────────────────────────────────────

/// A closed interval `[start, end]` on the simulation time line.
///
/// Arrival before `start` is allowed (the resource waits); arrival after
/// `end` is infeasible.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeWindow {
    pub start: SimTime,
    pub end: SimTime,
}

impl TimeWindow {
    pub fn new(start: impl Into<SimTime>, end: impl Into<SimTime>) -> Self {
        Self { start: start.into(), end: end.into() }
    }

    /// `true` iff arriving at `t` does not violate the window.
    #[inline]
    pub fn is_feasible(&self, t: SimTime) -> bool {
        t <= self.end
    }

    /// `true` iff `start <= t <= end`.
    #[inline]
    pub fn contains(&self, t: SimTime) -> bool {
        self.start <= t && t <= self.end
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Earliest time service can begin for an arrival at `t`.
    #[inline]
    pub fn service_start(&self, arrival: SimTime) -> SimTime {
        arrival.max(self.start)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.start.0, self.end.0)
    }
}
