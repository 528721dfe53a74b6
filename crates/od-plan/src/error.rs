//! Plan-subsystem error type.

use thiserror::Error;

use od_core::{NodeId, ResourceId};
use od_model::ModelError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("plan has no tour for {0}")]
    UnknownResource(ResourceId),

    #[error("{node} is not on the tour of {resource}")]
    NodeNotInTour { resource: ResourceId, node: NodeId },

    #[error("tour of {resource} is infeasible at {node}: arrival {arrival:.3} after deadline {deadline:.3}")]
    Infeasible {
        resource: ResourceId,
        node: NodeId,
        arrival: f64,
        deadline: f64,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type PlanResult<T> = Result<T, PlanError>;
