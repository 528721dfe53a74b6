//! Record of dispatched events, in dispatch order.

use crate::{Event, ScheduledEvent};

#[derive(Default, Debug, Clone)]
pub struct DispatchHistory {
    events: Vec<ScheduledEvent>,
}

impl DispatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    /// Most recently dispatched event.
    pub fn last(&self) -> Option<&ScheduledEvent> {
        self.events.last()
    }

    /// The event dispatched just before [`last`](Self::last).
    pub fn penultimate(&self) -> Option<&ScheduledEvent> {
        self.events.len().checked_sub(2).map(|i| &self.events[i])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> + '_ {
        self.events.iter()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.iter().map(|s| s.event).collect()
    }

    /// `true` if dispatch timestamps never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.events.windows(2).all(|w| w[0].time() <= w[1].time())
    }
}
