//! Per-resource state.

use std::fmt;

use od_core::{NodeId, ResourceId};

/// Lifecycle of a resource during a run.
///
/// ```text
/// NotStarted → Idle → Busy → Servicing → Idle → ... → Stopped
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    NotStarted,
    /// At a node with nothing to do; waiting for a dispatch decision.
    Idle,
    /// Travelling to an assigned request.
    Busy,
    Servicing,
    Stopped,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::NotStarted => "NOT_STARTED",
            ResourceState::Idle => "IDLE",
            ResourceState::Busy => "BUSY",
            ResourceState::Servicing => "SERVICING",
            ResourceState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Everything remembered about one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub state: ResourceState,
    /// Last node the resource reached.  `NodeId::INVALID` until placed.
    pub current_node: NodeId,
    /// Requests assigned but not yet served, in assignment order.
    pub assigned: Vec<NodeId>,
    /// Nodes served, in service order.
    pub served: Vec<NodeId>,
}

impl ResourceRecord {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: ResourceState::NotStarted,
            current_node: NodeId::INVALID,
            assigned: Vec::new(),
            served: Vec::new(),
        }
    }
}
