//! Domain layer types and invariants.

pub mod entities;
pub mod snapshots;
pub mod types;
