//! Timestamped dispatch events.

use std::fmt;

use od_core::{NodeId, ResourceId, SimTime};

/// Payload of an [`Event`].
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// A request becomes known.
    NewRequest { node: NodeId },
    ResourceStart { resource: ResourceId },
    ResourceStop { resource: ResourceId },
    /// The resource commits to travel to `node`.
    ///
    /// `arrival` is the projected arrival time; it is reset to `None` when
    /// the assignment is superseded before dispatch.
    RequestAssigned {
        resource: ResourceId,
        node: NodeId,
        arrival: Option<SimTime>,
    },
    StartOfService { resource: ResourceId, node: NodeId },
    EndOfService { resource: ResourceId, node: NodeId },
    /// Re-evaluate dispatch against the latest plan.
    Decision,
}

/// Fieldless discriminant of [`EventKind`], used by cleaners.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventTag {
    NewRequest,
    ResourceStart,
    ResourceStop,
    RequestAssigned,
    StartOfService,
    EndOfService,
    Decision,
}

impl EventKind {
    pub fn tag(&self) -> EventTag {
        match self {
            EventKind::NewRequest { .. } => EventTag::NewRequest,
            EventKind::ResourceStart { .. } => EventTag::ResourceStart,
            EventKind::ResourceStop { .. } => EventTag::ResourceStop,
            EventKind::RequestAssigned { .. } => EventTag::RequestAssigned,
            EventKind::StartOfService { .. } => EventTag::StartOfService,
            EventKind::EndOfService { .. } => EventTag::EndOfService,
            EventKind::Decision => EventTag::Decision,
        }
    }

    pub fn resource(&self) -> Option<ResourceId> {
        match *self {
            EventKind::ResourceStart { resource }
            | EventKind::ResourceStop { resource }
            | EventKind::RequestAssigned { resource, .. }
            | EventKind::StartOfService { resource, .. }
            | EventKind::EndOfService { resource, .. } => Some(resource),
            EventKind::NewRequest { .. } | EventKind::Decision => None,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match *self {
            EventKind::NewRequest { node }
            | EventKind::RequestAssigned { node, .. }
            | EventKind::StartOfService { node, .. }
            | EventKind::EndOfService { node, .. } => Some(node),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub time: SimTime,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: SimTime, kind: EventKind) -> Self {
        Self { time, kind }
    }

    pub fn decision(time: SimTime) -> Self {
        Self::new(time, EventKind::Decision)
    }

    #[inline]
    pub fn tag(&self) -> EventTag {
        self.kind.tag()
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.3}", self.tag(), self.time.0)?;
        if let Some(r) = self.kind.resource() {
            write!(f, " {r}")?;
        }
        if let Some(n) = self.kind.node() {
            write!(f, " {n}")?;
        }
        Ok(())
    }
}
