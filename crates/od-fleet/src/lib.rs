//! `od-fleet` — bookkeeping for the fleet and the requests it serves.
//!
//! Nothing here decides anything: the decision protocol drives every
//! mutation, and these types only remember the outcome.
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`state`]     | `ResourceState`, `ResourceRecord`                       |
//! | [`tracker`]   | `ResourceTracker`, `StateChange`, `StateListener`       |
//! | [`ledger`]    | `RequestLedger`                                         |

pub mod ledger;
pub mod state;
pub mod tracker;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use ledger::RequestLedger;
pub use state::{ResourceRecord, ResourceState};
pub use tracker::{ResourceTracker, StateChange, StateListener};
