use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the traffic crates.
#[derive(Error, Debug)]
pub enum TrafficError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The given usage export path does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No JSON usage exports were found under the given directory.
    #[error("No JSON files found in {0}")]
    NoDataFiles(PathBuf),

    /// The aggregation computation failed for a request.
    #[error("Processing error: {0}")]
    Processing(String),

    /// The aggregation worker is gone and can no longer answer requests.
    #[error("Aggregation worker closed")]
    WorkerClosed,

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the traffic crates.
pub type Result<T> = std::result::Result<T, TrafficError>;
