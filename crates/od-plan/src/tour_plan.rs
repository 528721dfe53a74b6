//! Reference [`Plan`] implementation: one [`Tour`] per resource.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use od_core::{NodeId, ResourceId, SimTime};
use od_model::{CostModel, Instance};

use crate::{Plan, PlanError, PlanResult, Tour};

#[derive(Clone)]
pub struct TourPlan {
    instance: Arc<Instance>,
    cost: Arc<dyn CostModel>,
    tours: Vec<Tour>,
    unserved: BTreeSet<NodeId>,
}

impl TourPlan {
    /// Every resource waits at its start home for the depot to open; every
    /// tour is `[start_home, end_home]`.
    pub fn new(instance: Arc<Instance>, cost: Arc<dyn CostModel>) -> Self {
        let open = instance.depot_window().start;
        let tours = instance
            .resources()
            .iter()
            .map(|r| {
                let mut t = Tour::new(r.id, r.start_home, open);
                t.set_route(&[r.end_home]);
                t
            })
            .collect();
        let mut plan = Self { instance, cost, tours, unserved: BTreeSet::new() };
        plan.refresh_all();
        plan
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn cost(&self) -> &Arc<dyn CostModel> {
        &self.cost
    }

    pub fn tours(&self) -> &[Tour] {
        &self.tours
    }

    pub fn tour(&self, resource: ResourceId) -> Option<&Tour> {
        self.tours.get(resource.index())
    }

    /// Replace the remainder of a tour.  `route` excludes the current node.
    pub fn set_route(&mut self, resource: ResourceId, route: &[NodeId]) -> PlanResult<()> {
        let (tour, instance, cost) = self.parts(resource)?;
        tour.set_route(route);
        tour.refresh(instance, cost);
        for n in route {
            self.unserved.remove(n);
        }
        Ok(())
    }

    /// Record that the resource is now at `node` and may leave at `available_at`.
    pub fn advance(&mut self, resource: ResourceId, node: NodeId, available_at: SimTime) -> PlanResult<()> {
        let (tour, instance, cost) = self.parts(resource)?;
        tour.advance_to(node, available_at);
        tour.refresh(instance, cost);
        Ok(())
    }

    /// Insert `node` before position `pos` of the resource's tour (after the
    /// current node at minimum).
    pub fn insert(&mut self, resource: ResourceId, pos: usize, node: NodeId) -> PlanResult<()> {
        let tour = self
            .tours
            .get(resource.index())
            .ok_or(PlanError::UnknownResource(resource))?;
        let mut route: Vec<NodeId> = tour.nodes()[1..].to_vec();
        let at = pos.saturating_sub(1).min(route.len());
        route.insert(at, node);
        self.set_route(resource, &route)
    }

    /// Take `node` off whichever tour visits it and mark it unserved.
    pub fn unassign(&mut self, node: NodeId) {
        let mut removed = false;
        for tour in &mut self.tours {
            if tour.remove(node) {
                tour.refresh(&self.instance, self.cost.as_ref());
                removed = true;
            }
        }
        if removed {
            self.unserved.insert(node);
        }
    }

    pub fn add_unserved(&mut self, node: NodeId) {
        if !self.tours.iter().any(|t| t.contains(node)) {
            self.unserved.insert(node);
        }
    }

    pub fn remove_unserved(&mut self, node: NodeId) -> bool {
        self.unserved.remove(&node)
    }

    /// Resource whose tour visits `node` after its current position.
    pub fn assigned_to(&self, node: NodeId) -> Option<ResourceId> {
        self.tours
            .iter()
            .find(|t| t.position(node).is_some_and(|i| i > 0))
            .map(|t| t.resource())
    }

    fn refresh_all(&mut self) {
        for tour in &mut self.tours {
            tour.refresh(&self.instance, self.cost.as_ref());
        }
    }

    fn parts(&mut self, resource: ResourceId) -> PlanResult<(&mut Tour, &Instance, &dyn CostModel)> {
        let tour = self
            .tours
            .get_mut(resource.index())
            .ok_or(PlanError::UnknownResource(resource))?;
        Ok((tour, &*self.instance, self.cost.as_ref()))
    }
}

impl Plan for TourPlan {
    fn unserved_requests(&self) -> Vec<NodeId> {
        self.unserved.iter().copied().collect()
    }

    fn current_node(&self, resource: ResourceId) -> Option<NodeId> {
        self.tour(resource).map(Tour::current)
    }

    fn next_node(&self, resource: ResourceId) -> Option<NodeId> {
        self.tour(resource).and_then(Tour::next)
    }

    fn earliest_arrival(&self, resource: ResourceId, node: NodeId) -> Option<SimTime> {
        self.tour(resource)?.arrival(node)
    }

    fn earliest_departure(&self, resource: ResourceId, node: NodeId) -> Option<SimTime> {
        self.tour(resource)?.departure(node)
    }

    fn wait_departure_time(&self, resource: ResourceId, node: NodeId) -> Option<SimTime> {
        self.tour(resource)?.wait_departure(node)
    }

    fn latest_feasible_departure(&self, resource: ResourceId, node: NodeId) -> Option<SimTime> {
        self.tour(resource)?.latest_departure(node)
    }

    fn freeze(
        &mut self,
        resource: ResourceId,
        node: NodeId,
        earliest_arrival: SimTime,
        horizon: SimTime,
    ) -> PlanResult<()> {
        let (tour, instance, cost) = self.parts(resource)?;
        if !tour.freeze(node, earliest_arrival, horizon) {
            return Err(PlanError::NodeNotInTour { resource, node });
        }
        tour.refresh(instance, cost);
        debug!(%resource, %node, horizon = horizon.0, "tour frozen");
        tour.check(instance)
    }

    fn unfreeze(&mut self, resource: ResourceId) {
        if let Ok((tour, instance, cost)) = self.parts(resource) {
            tour.unfreeze();
            tour.refresh(instance, cost);
        }
    }

    fn is_feasible(&self) -> bool {
        self.tours.iter().all(Tour::is_feasible)
    }
}

impl fmt::Debug for TourPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TourPlan")
            .field("instance", &self.instance.name())
            .field("tours", &self.tours.iter().map(Tour::nodes).collect::<Vec<_>>())
            .field("unserved", &self.unserved)
            .finish()
    }
}

impl fmt::Display for TourPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tour in &self.tours {
            write!(f, "{}:", tour.resource())?;
            for n in tour.nodes() {
                write!(f, " {}", n.0)?;
            }
            writeln!(f)?;
        }
        write!(f, "unserved: {:?}", self.unserved.iter().map(|n| n.0).collect::<Vec<_>>())
    }
}
