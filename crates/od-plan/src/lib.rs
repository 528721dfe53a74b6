//! `od-plan` — what the dispatch engine needs to know about candidate plans.
//!
//! The optimizer owns and evolves plans; the engine only queries them and
//! bounds them with freezes.  [`Plan`] is that narrow surface.  [`TourPlan`]
//! is a complete reference implementation used by the demo optimizer and by
//! tests.
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`plan`]      | `Plan` trait                                            |
//! | [`tour`]      | `Tour`, `Freeze`, forward/backward schedule passes      |
//! | [`tour_plan`] | `TourPlan`                                              |
//! | [`pool`]      | `ScenarioPool`                                          |
//! | [`error`]     | `PlanError`, `PlanResult`                               |

pub mod error;
pub mod plan;
pub mod pool;
pub mod tour;
pub mod tour_plan;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{PlanError, PlanResult};
pub use plan::Plan;
pub use pool::ScenarioPool;
pub use tour::{Freeze, Tour};
pub use tour_plan::TourPlan;
