//! Event-subsystem error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    #[error("cannot schedule {event} at {time:.3}: clock already at {now:.3}")]
    ScheduledInPast { event: String, time: f64, now: f64 },

    #[error("cannot schedule {event} at non-finite time")]
    NonFiniteTime { event: String },
}

pub type EventResult<T> = Result<T, EventError>;
