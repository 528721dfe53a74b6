//! `od-model` — the static problem description consumed by the dispatch engine.
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`instance`]    | `Instance`, `Node`, `NodeKind`, `Resource`, builder   |
//! | [`cost`]        | `CostModel` trait, `EuclideanCost`, `MatrixCost`      |
//! | [`generator`]   | `GeneratorConfig`, seeded `generate`                  |
//! | [`error`]       | `ModelError`, `ModelResult`                           |
//!
//! Instance file parsing is deliberately absent; callers build instances in
//! code or through the generator.

pub mod cost;
pub mod error;
pub mod generator;
pub mod instance;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use cost::{CostModel, EuclideanCost, MatrixCost};
pub use error::{ModelError, ModelResult};
pub use generator::{GeneratorConfig, generate};
pub use instance::{Instance, InstanceBuilder, Node, NodeKind, Point, Resource};
