//! Runtime layer for the traffic usage tooling.
//!
//! Hosts the aggregation worker that computes chart data off the caller's
//! task, its tagged message protocol, and the correlation-id client used at
//! call sites.

pub mod client;
pub mod messages;
pub mod worker;

pub use traffic_core as core;
pub use traffic_data as data;
