//! Static description of a dynamic routing instance.
//!
//! Nodes are stored in a dense `Vec` indexed by [`NodeId`].  Every resource
//! owns two dedicated nodes, its start home and its end home; everything else
//! is a request.  A request is identified by its node.

use od_core::{NodeId, ResourceId, SimTime, TimeWindow};

use crate::{ModelError, ModelResult};

// ── Point ─────────────────────────────────────────────────────────────────────

/// Planar coordinates in instance distance units.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Request,
    StartHome(ResourceId),
    EndHome(ResourceId),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub location: Point,
    pub time_window: TimeWindow,
    /// Service duration in simulated units.
    pub service_time: f64,
    /// When the request becomes known.  `None` means known from the start.
    pub release: Option<SimTime>,
}

impl Node {
    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == NodeKind::Request
    }
}

// ── Resource ──────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    pub id: ResourceId,
    pub start_home: NodeId,
    pub end_home: NodeId,
}

// ── Instance ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Instance {
    name: String,
    group: String,
    nodes: Vec<Node>,
    resources: Vec<Resource>,
    depot_window: TimeWindow,
    /// Fraction of the depot horizon after which no releases are expected.
    cutoff_fraction: Option<f64>,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Benchmark group ("C1", "R2", ...) used to look up the cutoff fraction.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn depot_window(&self) -> TimeWindow {
        self.depot_window
    }

    pub fn fleet_size(&self) -> usize {
        self.resources.len()
    }

    pub fn request_count(&self) -> usize {
        self.requests().count()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn requests(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.is_request())
    }

    pub fn node(&self, id: NodeId) -> ModelResult<&Node> {
        self.nodes.get(id.index()).ok_or(ModelError::UnknownNode(id))
    }

    pub fn resource(&self, id: ResourceId) -> ModelResult<&Resource> {
        self.resources
            .get(id.index())
            .ok_or(ModelError::UnknownResource(id))
    }

    /// `true` if `node` is a start or end home of any resource.
    pub fn is_home(&self, node: NodeId) -> bool {
        self.node(node).map(|n| !n.is_request()).unwrap_or(false)
    }

    /// `true` if `node` is the end home of `resource`.
    pub fn is_end_home_of(&self, resource: ResourceId, node: NodeId) -> bool {
        self.resource(resource)
            .map(|r| r.end_home == node)
            .unwrap_or(false)
    }

    pub fn with_cutoff_fraction(mut self, fraction: Option<f64>) -> ModelResult<Self> {
        if let Some(f) = fraction {
            check_cutoff(f)?;
        }
        self.cutoff_fraction = fraction;
        Ok(self)
    }

    pub fn cutoff_fraction(&self) -> Option<f64> {
        self.cutoff_fraction
    }

    /// Time after which no new releases are expected, if known.
    pub fn cutoff_time(&self) -> Option<SimTime> {
        self.cutoff_fraction
            .map(|f| SimTime(self.depot_window.end.0 * f))
    }

    /// Without a cutoff fraction the cutoff is never reached.
    pub fn is_past_cutoff(&self, t: SimTime) -> bool {
        self.cutoff_time().is_some_and(|c| t > c)
    }

    /// `(release, node)` for every request with a release date, sorted by time.
    pub fn release_schedule(&self) -> Vec<(SimTime, NodeId)> {
        let mut out: Vec<_> = self
            .requests()
            .filter_map(|n| n.release.map(|r| (r, n.id)))
            .collect();
        out.sort();
        out
    }

    /// Requests known at time zero.
    pub fn static_requests(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.requests().filter(|n| n.release.is_none()).map(|n| n.id)
    }
}

fn check_cutoff(f: f64) -> ModelResult<()> {
    if (0.0..=1.0).contains(&f) {
        Ok(())
    } else {
        Err(ModelError::InvalidCutoff(f))
    }
}

// ── InstanceBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Instance`].
///
/// ```rust,ignore
/// let mut b = InstanceBuilder::new("toy", TimeWindow::new(0.0, 100.0));
/// let r = b.add_resource(Point::new(0.0, 0.0));
/// let n = b.add_request(Point::new(3.0, 4.0), TimeWindow::new(0.0, 50.0), 2.0, None);
/// let instance = b.build()?;
/// ```
pub struct InstanceBuilder {
    name: String,
    group: String,
    depot_window: TimeWindow,
    nodes: Vec<Node>,
    resources: Vec<Resource>,
    cutoff_fraction: Option<f64>,
}

impl InstanceBuilder {
    pub fn new(name: impl Into<String>, depot_window: TimeWindow) -> Self {
        Self {
            name: name.into(),
            group: String::new(),
            depot_window,
            nodes: Vec::new(),
            resources: Vec::new(),
            cutoff_fraction: None,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn cutoff_fraction(mut self, fraction: f64) -> Self {
        self.cutoff_fraction = Some(fraction);
        self
    }

    /// Add a resource whose start and end homes share `home`.
    pub fn add_resource(&mut self, home: Point) -> ResourceId {
        self.add_resource_with_homes(home, home)
    }

    pub fn add_resource_with_homes(&mut self, start: Point, end: Point) -> ResourceId {
        let id = ResourceId(self.resources.len() as u32);
        let window = self.depot_window;
        let start_home = self.push_node(NodeKind::StartHome(id), start, window, 0.0, None);
        let end_home = self.push_node(NodeKind::EndHome(id), end, window, 0.0, None);
        self.resources.push(Resource { id, start_home, end_home });
        id
    }

    pub fn add_request(
        &mut self,
        location: Point,
        time_window: TimeWindow,
        service_time: f64,
        release: Option<SimTime>,
    ) -> NodeId {
        self.push_node(NodeKind::Request, location, time_window, service_time, release)
    }

    fn push_node(
        &mut self,
        kind: NodeKind,
        location: Point,
        time_window: TimeWindow,
        service_time: f64,
        release: Option<SimTime>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { id, kind, location, time_window, service_time, release });
        id
    }

    pub fn build(self) -> ModelResult<Instance> {
        if self.resources.is_empty() {
            return Err(ModelError::NoResources);
        }
        if let Some(f) = self.cutoff_fraction {
            check_cutoff(f)?;
        }
        for node in &self.nodes {
            let tw = node.time_window;
            if tw.start > tw.end {
                return Err(ModelError::InvalidWindow { node: node.id, window: tw });
            }
            if !(node.service_time >= 0.0) {
                return Err(ModelError::NegativeService { node: node.id, service: node.service_time });
            }
            if let Some(r) = node.release {
                if r > tw.end {
                    return Err(ModelError::LateRelease { node: node.id, release: r.0 });
                }
            }
        }
        Ok(Instance {
            name: self.name,
            group: self.group,
            nodes: self.nodes,
            resources: self.resources,
            depot_window: self.depot_window,
            cutoff_fraction: self.cutoff_fraction,
        })
    }
}
