//! Metrics for the squall extractor.

pub mod events;

pub use events::*;
