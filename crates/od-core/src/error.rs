//! Core error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("simulation speed must be positive and finite, got {0}")]
    InvalidSpeed(f64),

    #[error("clock has already been started")]
    ClockAlreadyStarted,

    #[error("clock cannot be set to non-finite time {0}")]
    InvalidTime(f64),
}

/// Shorthand result type for `od-core`.
pub type CoreResult<T> = Result<T, CoreError>;
