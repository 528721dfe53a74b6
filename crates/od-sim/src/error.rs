//! Engine error type.
//!
//! Every variant other than the wrapped lower-level errors is fatal for the
//! run: it signals an optimizer bug or a genuinely infeasible instance.

use thiserror::Error;

use od_core::{CoreError, NodeId, ResourceId};
use od_event::EventError;
use od_model::ModelError;
use od_plan::PlanError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn simulator thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("null plan published at {now:.3} while resources are still active: {states}\npool: {pool}")]
    NullPlan { now: f64, states: String, pool: String },

    #[error("plan published at {now:.3} abandons expired requests {nodes:?}\nplan: {plan}\npool: {pool}")]
    ExpiredRequests {
        now: f64,
        nodes: Vec<NodeId>,
        plan: String,
        pool: String,
    },

    #[error(
        "latest departure {latest:.3} of {resource} from {node} precedes time {now:.3} \
         and last event {last_event:.3} beyond tolerance\nplan: {plan}\npool: {pool}"
    )]
    MissedDeparture {
        resource: ResourceId,
        node: NodeId,
        latest: f64,
        now: f64,
        last_event: f64,
        plan: String,
        pool: String,
    },

    #[error("cannot move clock to {target:.3}: penultimate event at {penultimate:.3} (tolerance {tolerance:.3})")]
    ClockRewind {
        target: f64,
        penultimate: f64,
        tolerance: f64,
    },

    #[error("current best plan became infeasible freezing {resource}: {source}\npool: {pool}")]
    CurrentBestInfeasible {
        resource: ResourceId,
        #[source]
        source: PlanError,
        pool: String,
    },

    #[error("all resources idle at {now:.3} but nothing was assigned; unserved requests {unserved:?}\npool: {pool}")]
    IdleWithoutAssignment { now: f64, unserved: Vec<NodeId>, pool: String },

    #[error("event queue can only be cleaned while the clock is paused")]
    NotPaused,

    #[error("simulation time {now:.3} exceeded limit {limit:.3}")]
    SimulationOverrun { now: f64, limit: f64 },
}

pub type SimResult<T> = Result<T, SimError>;
