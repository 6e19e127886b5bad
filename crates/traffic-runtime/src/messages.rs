//! Request and response messages exchanged with the aggregation worker.
//!
//! The JSON shape is tagged by a `type` field:
//! `PROCESS_DATA` in, `DATA_PROCESSED` or `ERROR` out. Every message carries
//! a correlation `id` so callers can match responses to requests.

use serde::{Deserialize, Serialize};
use traffic_core::error::{Result, TrafficError};
use traffic_core::models::{AggregationParameters, AggregationResult, UsageRecord};

/// Correlation id attached to a request and echoed in its response.
pub type RequestId = u64;

/// A unit of work for the aggregation worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    #[serde(rename = "PROCESS_DATA")]
    ProcessData {
        #[serde(default)]
        id: RequestId,
        data: Vec<UsageRecord>,
        #[serde(default)]
        payload: AggregationParameters,
    },
}

impl WorkerRequest {
    pub fn process_data(
        id: RequestId,
        data: Vec<UsageRecord>,
        payload: AggregationParameters,
    ) -> Self {
        Self::ProcessData { id, data, payload }
    }

    pub fn id(&self) -> RequestId {
        match self {
            Self::ProcessData { id, .. } => *id,
        }
    }
}

/// The worker's answer to exactly one [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    #[serde(rename = "DATA_PROCESSED")]
    DataProcessed {
        id: RequestId,
        result: AggregationResult,
    },
    /// The computation failed; `error` is a human-readable description.
    #[serde(rename = "ERROR")]
    Error { id: RequestId, error: String },
}

impl WorkerResponse {
    pub fn id(&self) -> RequestId {
        match self {
            Self::DataProcessed { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    /// Convert into the aggregation result, mapping `ERROR` to
    /// [`TrafficError::Processing`].
    pub fn into_result(self) -> Result<AggregationResult> {
        match self {
            Self::DataProcessed { result, .. } => Ok(result),
            Self::Error { error, .. } => Err(TrafficError::Processing(error)),
        }
    }
}
