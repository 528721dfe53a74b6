//! The narrow plan interface consumed by the dispatch engine.

use std::fmt;

use od_core::{NodeId, ResourceId, SimTime};

use crate::PlanResult;

/// A full assignment of requests to resource tours.
///
/// Every per-resource query returns `None` when the resource has no tour or
/// `node` is not on it.  Implementations must be `Send + Sync`: the
/// simulator thread reads and freezes plans owned by the optimizer.
pub trait Plan: Send + Sync + fmt::Debug {
    /// Released requests this plan does not visit.
    fn unserved_requests(&self) -> Vec<NodeId>;

    /// Where the resource's tour currently starts.
    fn current_node(&self, resource: ResourceId) -> Option<NodeId>;

    /// The node visited right after the current one.
    fn next_node(&self, resource: ResourceId) -> Option<NodeId>;

    fn earliest_arrival(&self, resource: ResourceId, node: NodeId) -> Option<SimTime>;

    fn earliest_departure(&self, resource: ResourceId, node: NodeId) -> Option<SimTime>;

    /// Earliest departure plus the waiting time the successor would incur,
    /// i.e. the latest departure that does not delay service at the successor.
    fn wait_departure_time(&self, resource: ResourceId, node: NodeId) -> Option<SimTime>;

    /// Latest departure from `node` that keeps the rest of the tour feasible.
    fn latest_feasible_departure(&self, resource: ResourceId, node: NodeId) -> Option<SimTime>;

    /// Bound the tour so that the resource reaches `node` no earlier than
    /// `earliest_arrival` and leaves it no earlier than `horizon`.
    ///
    /// Bounds only ever tighten: a freeze below an existing bound leaves it
    /// in place.  The bound is kept even when the tour becomes infeasible, in
    /// which case `PlanError::Infeasible` is returned.
    fn freeze(
        &mut self,
        resource: ResourceId,
        node: NodeId,
        earliest_arrival: SimTime,
        horizon: SimTime,
    ) -> PlanResult<()>;

    /// Drop every freeze on the resource's tour.
    fn unfreeze(&mut self, resource: ResourceId);

    fn is_feasible(&self) -> bool;
}
