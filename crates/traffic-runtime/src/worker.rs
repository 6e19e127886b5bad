//! Background aggregation worker.
//!
//! Runs [`UsageAggregator::aggregate`] off the caller's task: requests arrive
//! on a bounded `mpsc` channel, each is computed on tokio's blocking pool, and
//! exactly one [`WorkerResponse`] is sent back per request. Responses go out on
//! an unbounded channel so the worker never waits on a caller that is still
//! submitting. A panic inside the computation becomes an `ERROR` response and
//! the worker keeps serving.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use traffic_core::models::{AggregationParameters, AggregationResult, UsageRecord};
use traffic_data::aggregator::UsageAggregator;

use crate::messages::{RequestId, WorkerRequest, WorkerResponse};

/// Default number of requests that may queue before senders wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// The computation a worker runs for each request.
pub type Processor = fn(&[UsageRecord], &AggregationParameters) -> AggregationResult;

// ── AggregationWorker ─────────────────────────────────────────────────────────

/// Builder for the background worker task.
///
/// Call [`AggregationWorker::start`] to spawn it and get the channel endpoints.
pub struct AggregationWorker {
    queue_capacity: usize,
    processor: Processor,
}

impl Default for AggregationWorker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl AggregationWorker {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            processor: UsageAggregator::aggregate,
        }
    }

    /// Replace the computation run for each request.
    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    /// Spawn the worker loop on the current tokio runtime.
    ///
    /// Returns the request sender, the response receiver and a
    /// [`WorkerHandle`]. The loop ends when every request sender is dropped
    /// or the response receiver is closed.
    pub fn start(
        self,
    ) -> (
        mpsc::Sender<WorkerRequest>,
        mpsc::UnboundedReceiver<WorkerResponse>,
        WorkerHandle,
    ) {
        let (request_tx, request_rx) = mpsc::channel(self.queue_capacity);
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let processor = self.processor;
        let handle = tokio::spawn(async move {
            worker_loop(processor, request_rx, response_tx).await;
        });

        (request_tx, response_rx, WorkerHandle { handle })
    }
}

// ── WorkerHandle ──────────────────────────────────────────────────────────────

/// A handle to the background worker task.
pub struct WorkerHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Terminate the worker. A computation already running on the blocking
    /// pool finishes, but its result is discarded.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── JSON boundary ─────────────────────────────────────────────────────────────

/// Handle one raw JSON request message and return the JSON response.
///
/// Undecodable input yields an `ERROR` response. Its `id` is taken from the
/// raw message when present, otherwise 0.
pub fn process_message(raw: &str) -> String {
    let response = match serde_json::from_str::<WorkerRequest>(raw) {
        Ok(request) => run_request(UsageAggregator::aggregate, request),
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed worker request");
            WorkerResponse::Error {
                id: raw_request_id(raw),
                error: format!("invalid request: {e}"),
            }
        }
    };

    serde_json::to_string(&response).unwrap_or_else(|e| {
        serde_json::json!({ "type": "ERROR", "id": response.id(), "error": e.to_string() })
            .to_string()
    })
}

// ── Private implementation ────────────────────────────────────────────────────

async fn worker_loop(
    processor: Processor,
    mut requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    tracing::debug!("aggregation worker started");

    while let Some(request) = requests.recv().await {
        let id = request.id();
        tracing::debug!(id, "processing aggregation request");

        let response =
            match tokio::task::spawn_blocking(move || run_request(processor, request)).await {
                Ok(response) => response,
                Err(e) => WorkerResponse::Error {
                    id,
                    error: format!("aggregation task failed: {e}"),
                },
            };

        if responses.send(response).is_err() {
            tracing::debug!("response channel closed; stopping aggregation worker");
            break;
        }
    }

    tracing::debug!("aggregation worker stopped");
}

/// Run one request to completion, converting a panic into an `ERROR` response.
fn run_request(processor: Processor, request: WorkerRequest) -> WorkerResponse {
    let WorkerRequest::ProcessData { id, data, payload } = request;

    match panic::catch_unwind(AssertUnwindSafe(|| processor(&data, &payload))) {
        Ok(result) => WorkerResponse::DataProcessed { id, result },
        Err(cause) => {
            let error = panic_message(cause.as_ref());
            tracing::error!(id, %error, "aggregation failed");
            WorkerResponse::Error { id, error }
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(msg) = cause.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = cause.downcast_ref::<String>() {
        msg.clone()
    } else {
        "aggregation panicked".to_string()
    }
}

fn raw_request_id(raw: &str) -> RequestId {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_u64()))
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
