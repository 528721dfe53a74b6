//! Travel-cost models.
//!
//! # Pluggability
//!
//! The dispatch engine and the reference plan only ever ask a [`CostModel`]
//! for travel times, so applications can plug in road-network times,
//! per-resource speeds or a precomputed matrix.
//!
//! Unknown nodes yield `f64::INFINITY`, which downstream feasibility checks
//! treat as unreachable.

use od_core::{NodeId, ResourceId};

use crate::{Instance, ModelError, ModelResult, Point};

// ── CostModel trait ───────────────────────────────────────────────────────────

/// Travel-time oracle.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`: the simulator thread and the
/// optimizer thread(s) query the same model concurrently.
pub trait CostModel: Send + Sync {
    /// Simulated time needed by `resource` to travel from `from` to `to`.
    fn travel_time(&self, from: NodeId, to: NodeId, resource: ResourceId) -> f64;
}

// ── EuclideanCost ─────────────────────────────────────────────────────────────

/// Straight-line distance divided by a uniform travel speed.
#[derive(Clone, Debug)]
pub struct EuclideanCost {
    locations: Vec<Point>,
    speed: f64,
}

impl EuclideanCost {
    pub fn new(locations: Vec<Point>, speed: f64) -> ModelResult<Self> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ModelError::InvalidSpeed(speed));
        }
        Ok(Self { locations, speed })
    }

    /// Unit speed over the instance's node locations.
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            locations: instance.nodes().iter().map(|n| n.location).collect(),
            speed: 1.0,
        }
    }
}

impl CostModel for EuclideanCost {
    fn travel_time(&self, from: NodeId, to: NodeId, _resource: ResourceId) -> f64 {
        if from == to {
            return 0.0;
        }
        match (self.locations.get(from.index()), self.locations.get(to.index())) {
            (Some(a), Some(b)) => a.distance(*b) / self.speed,
            _ => f64::INFINITY,
        }
    }
}

// ── MatrixCost ────────────────────────────────────────────────────────────────

/// Row-major `n × n` travel-time matrix shared by all resources.
#[derive(Clone, Debug)]
pub struct MatrixCost {
    n: usize,
    times: Vec<f64>,
}

impl MatrixCost {
    pub fn new(n: usize, times: Vec<f64>) -> ModelResult<Self> {
        let expected = n * n;
        if times.len() != expected {
            return Err(ModelError::MatrixSize { nodes: n, expected, got: times.len() });
        }
        Ok(Self { n, times })
    }

    /// Every off-diagonal pair takes `t`.
    pub fn uniform(n: usize, t: f64) -> Self {
        let mut times = vec![t; n * n];
        for i in 0..n {
            times[i * n + i] = 0.0;
        }
        Self { n, times }
    }

    pub fn set(&mut self, from: NodeId, to: NodeId, t: f64) {
        let (i, j) = (from.index(), to.index());
        if i < self.n && j < self.n {
            self.times[i * self.n + j] = t;
        }
    }
}

impl CostModel for MatrixCost {
    fn travel_time(&self, from: NodeId, to: NodeId, _resource: ResourceId) -> f64 {
        let (i, j) = (from.index(), to.index());
        if i < self.n && j < self.n {
            self.times[i * self.n + j]
        } else {
            f64::INFINITY
        }
    }
}
