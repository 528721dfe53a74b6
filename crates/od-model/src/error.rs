//! Model-subsystem error type.

use thiserror::Error;

use od_core::{NodeId, ResourceId, TimeWindow};

/// Errors produced by `od-model`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("node {0} not found in instance")]
    UnknownNode(NodeId),

    #[error("resource {0} not found in instance")]
    UnknownResource(ResourceId),

    #[error("instance has no resources")]
    NoResources,

    #[error("node {node} has an inverted time window {window}")]
    InvalidWindow { node: NodeId, window: TimeWindow },

    #[error("node {node} has negative service time {service}")]
    NegativeService { node: NodeId, service: f64 },

    #[error("node {node} is released at {release} after its window closes")]
    LateRelease { node: NodeId, release: f64 },

    #[error("cutoff fraction must lie in [0, 1], got {0}")]
    InvalidCutoff(f64),

    #[error("travel speed must be positive and finite, got {0}")]
    InvalidSpeed(f64),

    #[error("travel matrix for {nodes} nodes needs {expected} entries, got {got}")]
    MatrixSize { nodes: usize, expected: usize, got: usize },

    #[error("generator config: {0}")]
    Generator(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
