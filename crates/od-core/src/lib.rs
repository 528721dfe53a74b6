//! `od-core` — foundational types for the online dispatch engine.
//!
//! This crate is a dependency of every other `od-*` crate.  It has no `od-*`
//! dependencies and minimal external ones (`thiserror`, `tracing`, plus
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`ids`]       | `ResourceId`, `NodeId`, `ScenarioId`                    |
//! | [`time`]      | `SimTime`, `TimeWindow`                                 |
//! | [`clock`]     | `SimClock`, `ClockStatus`, `WallSource` + impls         |
//! | [`error`]     | `CoreError`, `CoreResult`                               |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to ids and time types.      |

pub mod clock;
pub mod error;
pub mod ids;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use clock::{ClockStatus, ManualWall, SimClock, SystemWall, WallSource};
pub use error::{CoreError, CoreResult};
pub use ids::{NodeId, ResourceId, ScenarioId};
pub use time::{SimTime, TimeWindow};
