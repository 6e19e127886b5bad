//! Shared building blocks for the traffic usage tooling.
//!
//! Holds the usage data model, the error type, CLI settings, byte and count
//! formatting, timestamp handling and the per-user chart colour palette.

pub mod colors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;
