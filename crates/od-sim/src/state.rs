//! Mutable engine state shared by the run loop and the protocol handlers.
//!
//! All of it lives behind a single mutex in [`Shared`]; whoever holds the
//! guard owns the clock, the queue and the fleet bookkeeping for that
//! critical section.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use od_core::{NodeId, SimClock, SimTime};
use od_event::{DispatchHistory, Event, EventQueue, QueueCleaner, ScheduledEvent};
use od_fleet::{RequestLedger, ResourceTracker};
use od_model::{CostModel, Instance};

use crate::{DispatchConfig, SimError, SimResult};

// ── SimState ──────────────────────────────────────────────────────────────────

pub struct SimState {
    pub clock:   SimClock,
    pub queue:   EventQueue,
    pub tracker: ResourceTracker,
    pub ledger:  RequestLedger,
    pub history: DispatchHistory,
    /// Projected arrival time of the most recent dispatch toward each node.
    pub arrivals: FxHashMap<NodeId, SimTime>,
    /// Rewind tolerance in simulated units.
    tolerance: f64,
}

impl SimState {
    pub fn new(clock: SimClock, tolerance_wall_secs: f64) -> Self {
        let tolerance = clock.wall_to_sim(tolerance_wall_secs);
        Self {
            clock,
            queue:    EventQueue::new(),
            tracker:  ResourceTracker::new(),
            ledger:   RequestLedger::new(),
            history:  DispatchHistory::new(),
            arrivals: FxHashMap::default(),
            tolerance,
        }
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Rewind tolerance in simulated units.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Schedule `event`; it may not lie before the current time.
    pub fn schedule(&mut self, event: Event) -> SimResult<u64> {
        Ok(self.queue.schedule(event, self.clock.now())?)
    }

    /// Remove queued events selected by `cleaner`.  The clock must not be running.
    pub fn clean_queue<C: QueueCleaner + ?Sized>(&mut self, cleaner: &mut C) -> SimResult<Vec<ScheduledEvent>> {
        if self.clock.status() == od_core::ClockStatus::Running {
            return Err(SimError::NotPaused);
        }
        Ok(self.queue.remove_where(cleaner))
    }

    /// Move the clock to `t`.
    ///
    /// Fails if `t` precedes the penultimate dispatched event by more than
    /// the tolerance.
    pub fn adjust_clock(&mut self, t: SimTime) -> SimResult<()> {
        if let Some(prev) = self.history.penultimate() {
            if t < prev.time() - self.tolerance {
                return Err(SimError::ClockRewind {
                    target:      t.0,
                    penultimate: prev.time().0,
                    tolerance:   self.tolerance,
                });
            }
        }
        debug!(from = self.clock.now().0, to = t.0, "clock adjusted");
        self.clock.set_now(t)?;
        Ok(())
    }

    /// Time of the last dispatched event, zero before the first.
    pub fn last_event_time(&self) -> SimTime {
        self.history.last().map_or(SimTime::ZERO, |e| e.time())
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

/// Everything the simulator handle and the protocol handles share.
pub(crate) struct Shared {
    pub(crate) state:     Mutex<SimState>,
    /// Signalled whenever the queue, the clock status or `running` changes.
    pub(crate) changed:   Condvar,
    pub(crate) running:   AtomicBool,
    optimizer_stopped:    AtomicBool,
    pub(crate) config:    DispatchConfig,
    pub(crate) instance:  Arc<Instance>,
    pub(crate) cost:      Arc<dyn CostModel>,
}

impl Shared {
    pub(crate) fn new(
        state:    SimState,
        config:   DispatchConfig,
        instance: Arc<Instance>,
        cost:     Arc<dyn CostModel>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
            running: AtomicBool::new(false),
            optimizer_stopped: AtomicBool::new(false),
            config,
            instance,
            cost,
        }
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the run loop and the clock.  The caller holds the state guard.
    pub(crate) fn stop_locked(&self, state: &mut SimState) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(now = state.now().0, "simulator stopped");
        }
        state.clock.stop();
        self.changed.notify_all();
    }

    /// `true` exactly once: for the caller that gets to stop the optimizer.
    pub(crate) fn claim_optimizer_stop(&self) -> bool {
        !self.optimizer_stopped.swap(true, Ordering::SeqCst)
    }
}
