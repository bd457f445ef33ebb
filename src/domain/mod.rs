//! Domain layer: value types shared by the cache, graph and command layers.

pub mod bodies;
pub mod error;
pub mod types;
