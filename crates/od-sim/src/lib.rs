//! `od-sim` — discrete-event run loop and decision/freeze protocol.
//!
//! Two threads cooperate.  The simulator thread releases queued events in
//! time order and hands each to the optimizer; the optimizer side processes
//! them and calls back into the engine through a [`DecisionProtocol`].
//!
//! ```text
//! simulator thread                       optimizer thread(s)
//! ────────────────                       ───────────────────
//! wait for head, pause clock
//! pop, move clock, push_event ─────────▶ handle_event / on_plan_published
//!                                          update fleet, schedule follow-ups
//!                                          freeze or raise assignments
//!                                          resume clock
//! ```
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`simulator`] | `Simulator`, `RunSummary`, the run loop                 |
//! | [`protocol`]  | `DecisionProtocol`, `DecisionContext`, `freeze_horizon` |
//! | [`policy`]    | `DispatchPolicy`, `FreezePolicy`, `NoWaitingPolicy`     |
//! | [`optimizer`] | `Optimizer` trait and its locking contract              |
//! | [`state`]     | `SimState`: clock, queue, tracker, ledger, history      |
//! | [`config`]    | `DispatchConfig`, `PolicyKind`                          |
//! | [`builder`]   | `SimBuilder`                                            |
//! | [`error`]     | `SimError`, `SimResult`                                 |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! let sim = SimBuilder::new(instance, Arc::clone(&optimizer)).build()?;
//! sim.seed_instance_events()?;
//! let protocol = sim.protocol();
//! let handle = sim.run_in_new_thread()?;
//! // optimizer thread: protocol.handle_event(&event)?, ...
//! let summary = handle.join().expect("simulator thread panicked")?;
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod policy;
pub mod protocol;
pub mod simulator;
pub mod state;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use builder::SimBuilder;
pub use config::{DispatchConfig, PolicyKind};
pub use error::{SimError, SimResult};
pub use optimizer::Optimizer;
pub use policy::{DispatchPolicy, FreezePolicy, NoWaitingPolicy, PolicyOutcome};
pub use protocol::{DecisionContext, DecisionProtocol, freeze_horizon};
pub use simulator::{RunSummary, Simulator};
pub use state::SimState;
