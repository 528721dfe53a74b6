//! `od-event` — everything that flows through the simulator's timeline.
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`event`]     | `Event`, `EventKind`, `EventTag`                        |
//! | [`queue`]     | `ScheduledEvent`, `EventQueue`                          |
//! | [`cleaner`]   | `QueueCleaner`, `DuplicateEventCleaner`, `AssignmentCleaner` |
//! | [`history`]   | `DispatchHistory`                                       |
//! | [`error`]     | `EventError`, `EventResult`                             |

pub mod cleaner;
pub mod error;
pub mod event;
pub mod history;
pub mod queue;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use cleaner::{AssignmentCleaner, DuplicateEventCleaner, QueueCleaner};
pub use error::{EventError, EventResult};
pub use event::{Event, EventKind, EventTag};
pub use history::DispatchHistory;
pub use queue::{EventQueue, ScheduledEvent};
