//! Snapshot aggregation and cached page reads.

pub mod directory;
pub mod error;
pub mod homepage;
pub mod media;
pub mod person;
pub mod repos;
pub mod town;
