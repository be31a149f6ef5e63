//! Metrics for the pelican consumer.

pub mod events;

pub use events::*;
