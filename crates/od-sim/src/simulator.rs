//! `Simulator` — the run loop that releases queued events in time order.
//!
//! # Per-event procedure
//!
//! ```text
//! wait until the queue head is due (or the loop is stopped)
//! pause clock
//! pop head, move clock to its time
//! push it into the optimizer, append it to the history
//! ```
//!
//! The loop never resumes the clock itself; the protocol handler that
//! processes the event does.  Between events the loop sleeps on a condition
//! variable with a timeout of at most the configured poll interval.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::MutexGuard;
use tracing::{debug, error, info};

use od_core::{ClockStatus, NodeId, ResourceId, SimTime};
use od_event::{Event, EventKind};
use od_fleet::{RequestLedger, ResourceRecord, ResourceState};
use od_model::Instance;

use crate::state::{Shared, SimState};
use crate::{DecisionProtocol, DispatchPolicy, Optimizer, SimResult};

/// What a finished run reports.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Events released by the loop.
    pub dispatched: usize,
    pub final_time: SimTime,
}

pub struct Simulator<O: Optimizer> {
    pub(crate) shared:    Arc<Shared>,
    pub(crate) optimizer: Arc<O>,
    pub(crate) policy:    Arc<dyn DispatchPolicy<O>>,
}

impl<O: Optimizer> Clone for Simulator<O> {
    fn clone(&self) -> Self {
        Self {
            shared:    Arc::clone(&self.shared),
            optimizer: Arc::clone(&self.optimizer),
            policy:    Arc::clone(&self.policy),
        }
    }
}

impl<O: Optimizer> Simulator<O> {
    /// Handle for the optimizer side.
    pub fn protocol(&self) -> DecisionProtocol<O> {
        DecisionProtocol::new(Arc::clone(&self.shared), Arc::clone(&self.optimizer), Arc::clone(&self.policy))
    }

    pub fn optimizer(&self) -> &Arc<O> {
        &self.optimizer
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.shared.instance
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Start the clock and leave it paused; the loop is marked running.
    ///
    /// [`run`](Self::run) calls this itself.  Harnesses that step the loop
    /// by hand with [`dispatch_due`](Self::dispatch_due) call it directly.
    pub fn start(&self) -> SimResult<()> {
        let mut st = self.shared.state.lock();
        st.clock.start()?;
        st.clock.pause();
        self.shared.running.store(true, Ordering::SeqCst);
        info!(speed = st.clock.speed(), "simulator started");
        Ok(())
    }

    /// Run the loop on the calling thread until stopped or a fatal error.
    pub fn run(&self) -> SimResult<RunSummary> {
        self.start()?;
        let result = self.run_loop();
        match &result {
            Ok(summary) => info!(
                dispatched = summary.dispatched,
                final_time = summary.final_time.0,
                "run finished"
            ),
            Err(e) => {
                error!(error = %e, "run aborted");
                if self.shared.claim_optimizer_stop() {
                    self.optimizer.stop();
                }
            }
        }
        let mut st = self.shared.state.lock();
        self.shared.stop_locked(&mut st);
        result
    }

    /// Spawn [`run`](Self::run) on a dedicated thread.
    pub fn run_in_new_thread(&self) -> SimResult<JoinHandle<SimResult<RunSummary>>> {
        let sim = self.clone();
        let handle = thread::Builder::new()
            .name("od-sim".into())
            .spawn(move || sim.run())?;
        Ok(handle)
    }

    /// Ask the loop to stop.  It exits after the dispatch in progress, if
    /// any, completes.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        self.shared.stop_locked(&mut st);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    fn run_loop(&self) -> SimResult<RunSummary> {
        let poll = self.shared.config.poll_interval();
        let mut dispatched = 0usize;
        loop {
            let mut st = self.shared.state.lock();
            if !self.wait_until_due(&mut st, poll) {
                return Ok(RunSummary { dispatched, final_time: st.now() });
            }
            if self.dispatch_locked(&mut st)?.is_some() {
                dispatched += 1;
            }
        }
    }

    /// Block until the queue head is due.  `false` once the loop is stopped.
    fn wait_until_due(&self, st: &mut MutexGuard<'_, SimState>, poll: Duration) -> bool {
        loop {
            if !self.shared.is_running() {
                return false;
            }
            let now = st.now();
            let timeout = match st.queue.peek_time() {
                Some(t) if t <= now => return true,
                Some(t) if st.clock.status() == ClockStatus::Running => {
                    let wall = st.clock.sim_to_wall(t - now);
                    Duration::from_secs_f64(wall.clamp(0.0, poll.as_secs_f64()))
                }
                _ => poll,
            };
            self.shared.changed.wait_for(st, timeout);
        }
    }

    /// Release the queue head if it is due.
    ///
    /// Does not wait and does not resume the clock.
    pub fn dispatch_due(&self) -> SimResult<Option<Event>> {
        let mut st = self.shared.state.lock();
        self.dispatch_locked(&mut st)
    }

    fn dispatch_locked(&self, st: &mut SimState) -> SimResult<Option<Event>> {
        let now = st.now();
        let Some(next) = st.queue.pop_due(now) else { return Ok(None) };
        st.clock.pause();
        st.adjust_clock(next.time())?;
        info!(event = %next.event, "event dispatched");
        self.optimizer.push_event(next.event);
        st.history.push(next);
        Ok(Some(next.event))
    }

    // ── Seeding ───────────────────────────────────────────────────────────

    /// Queue the instance's own events: a `NewRequest` at every release
    /// date and a `ResourceStart` when each home opens.  Requests known from
    /// the start are released into the ledger directly.
    ///
    /// Call before [`run`](Self::run).  Returns the number of events queued.
    pub fn seed_instance_events(&self) -> SimResult<usize> {
        let instance = Arc::clone(&self.shared.instance);
        let mut st = self.shared.state.lock();
        let mut count = 0;

        for node in instance.static_requests() {
            st.ledger.release(node);
        }
        for (t, node) in instance.release_schedule() {
            st.schedule(Event::new(t, EventKind::NewRequest { node }))?;
            count += 1;
        }
        for r in instance.resources() {
            let opens = instance.node(r.start_home)?.time_window.start;
            st.schedule(Event::new(opens, EventKind::ResourceStart { resource: r.id }))?;
            count += 1;
        }
        debug!(count, "instance events seeded");
        self.shared.changed.notify_all();
        Ok(count)
    }

    /// Queue an arbitrary event; it may not lie in the past.
    pub fn schedule(&self, event: Event) -> SimResult<u64> {
        let seq = self.shared.state.lock().schedule(event)?;
        self.shared.changed.notify_all();
        Ok(seq)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn simulation_time(&self) -> SimTime {
        self.shared.state.lock().now()
    }

    pub fn clock_status(&self) -> ClockStatus {
        self.shared.state.lock().clock.status()
    }

    pub fn state_of(&self, resource: ResourceId) -> ResourceState {
        self.shared.state.lock().tracker.state(resource)
    }

    pub fn current_node(&self, resource: ResourceId) -> Option<NodeId> {
        self.shared.state.lock().tracker.current_node(resource)
    }

    pub fn records(&self) -> Vec<ResourceRecord> {
        self.shared.state.lock().tracker.records().into_iter().cloned().collect()
    }

    pub fn ledger(&self) -> RequestLedger {
        self.shared.state.lock().ledger.clone()
    }

    /// Dispatched events, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.shared.state.lock().history.events()
    }

    pub fn history_is_monotonic(&self) -> bool {
        self.shared.state.lock().history.is_monotonic()
    }

    /// Queued events in dispatch order.
    pub fn pending_events(&self) -> Vec<Event> {
        self.shared.state.lock().queue.snapshot()
    }

    /// Projected arrival of the latest dispatch toward `node`.
    pub fn projected_arrival(&self, node: NodeId) -> Option<SimTime> {
        self.shared.state.lock().arrivals.get(&node).copied()
    }

    /// Run `f` with the engine state locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut *self.shared.state.lock())
    }
}
