//! Small formatting helpers shared across layers.

pub mod text;
pub mod time;
