//! Data layer for the traffic usage tooling.
//!
//! Loads usage exports from disk and aggregates them into chart-ready
//! per-user series and daily trends.

pub mod aggregator;
pub mod reader;

pub use traffic_core as core;
