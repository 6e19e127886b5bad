//! Call-site side of the aggregation worker.
//!
//! [`AggregationClient`] tags every request with a fresh correlation id and,
//! when waiting, skips responses to requests that have since been superseded.
//! Rapid filter changes therefore always resolve to the newest result.

use tokio::sync::mpsc;
use traffic_core::error::{Result, TrafficError};
use traffic_core::models::{AggregationParameters, AggregationResult, UsageRecord};

use crate::messages::{RequestId, WorkerRequest, WorkerResponse};
use crate::worker::{AggregationWorker, WorkerHandle};

/// Typed request/response channel to an [`AggregationWorker`].
///
/// # Example
/// ```no_run
/// use traffic_runtime::client::AggregationClient;
/// use traffic_runtime::worker::AggregationWorker;
/// use traffic_core::models::AggregationParameters;
///
/// # async fn run() -> traffic_core::error::Result<()> {
/// let (mut client, _handle) = AggregationClient::spawn(AggregationWorker::default());
/// let result = client.aggregate(vec![], AggregationParameters::default()).await?;
/// assert!(result.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct AggregationClient {
    requests: mpsc::Sender<WorkerRequest>,
    responses: mpsc::UnboundedReceiver<WorkerResponse>,
    /// Id handed to the next submitted request.
    next_id: RequestId,
    /// Id of the most recently submitted request.
    latest: Option<RequestId>,
    /// Description of the last `ERROR` response received.
    last_error: Option<String>,
}

impl AggregationClient {
    pub fn new(
        requests: mpsc::Sender<WorkerRequest>,
        responses: mpsc::UnboundedReceiver<WorkerResponse>,
    ) -> Self {
        Self {
            requests,
            responses,
            next_id: 1,
            latest: None,
            last_error: None,
        }
    }

    /// Start `worker` and connect a client to it.
    pub fn spawn(worker: AggregationWorker) -> (Self, WorkerHandle) {
        let (requests, responses, handle) = worker.start();
        (Self::new(requests, responses), handle)
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Queue a request and return its correlation id.
    ///
    /// The new request supersedes any earlier one still in flight, so
    /// responses that have already arrived are dropped here.
    pub async fn submit(
        &mut self,
        records: Vec<UsageRecord>,
        params: AggregationParameters,
    ) -> Result<RequestId> {
        self.discard_ready_responses();

        let id = self.next_id;
        self.next_id += 1;

        self.requests
            .send(WorkerRequest::process_data(id, records, params))
            .await
            .map_err(|_| TrafficError::WorkerClosed)?;

        self.latest = Some(id);
        tracing::debug!(id, "aggregation request submitted");
        Ok(id)
    }

    /// Wait for the response to the most recent request, discarding stale ones.
    pub async fn next_latest(&mut self) -> Result<AggregationResult> {
        let Some(latest) = self.latest else {
            return Err(TrafficError::Processing(
                "no aggregation request in flight".to_string(),
            ));
        };

        loop {
            let response = self
                .responses
                .recv()
                .await
                .ok_or(TrafficError::WorkerClosed)?;

            let id = response.id();
            if id != latest {
                tracing::debug!(id, latest, "discarding stale aggregation response");
                continue;
            }

            self.latest = None;
            return match response.into_result() {
                Ok(result) => {
                    self.last_error = None;
                    Ok(result)
                }
                Err(e) => {
                    tracing::warn!(id, error = %e, "aggregation request failed");
                    self.last_error = Some(e.to_string());
                    Err(e)
                }
            };
        }
    }

    /// Submit a request and wait for its result.
    pub async fn aggregate(
        &mut self,
        records: Vec<UsageRecord>,
        params: AggregationParameters,
    ) -> Result<AggregationResult> {
        self.submit(records, params).await?;
        self.next_latest().await
    }

    /// Id of the request whose response has not been collected yet.
    pub fn pending_request(&self) -> Option<RequestId> {
        self.latest
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn discard_ready_responses(&mut self) {
        let mut discarded = 0usize;
        while self.responses.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "discarding superseded aggregation responses");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use traffic_data::aggregator::UsageAggregator;

    fn records() -> Vec<UsageRecord> {
        vec![
            UsageRecord::new("alice", "2024-01-02", 500),
            UsageRecord::new("bob", "2024-01-02", 200),
            UsageRecord::new("alice", "2024-01-10", 300),
        ]
    }

    fn params() -> AggregationParameters {
        AggregationParameters {
            min_traffic_threshold: 100,
            max_displayed_users: 10,
            ..Default::default()
        }
    }

    fn panics_on_mallory(
        records: &[UsageRecord],
        params: &AggregationParameters,
    ) -> AggregationResult {
        if records.iter().any(|r| r.username == "mallory") {
            panic!("cannot aggregate mallory");
        }
        UsageAggregator::aggregate(records, params)
    }

    #[tokio::test]
    async fn test_aggregate_returns_result() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.aggregate(records(), params()),
        )
        .await
        .expect("timed out")
        .expect("aggregation failed");

        assert_eq!(result.categories, vec!["Jan 2", "Jan 10"]);
        assert_eq!(result.total_usage, 1000);
        assert!(client.pending_request().is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn test_ids_increase_per_submit() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

        let first = client.submit(records(), params()).await.unwrap();
        let second = client.submit(records(), params()).await.unwrap();
        assert!(second > first);
        assert_eq!(client.pending_request(), Some(second));

        handle.abort();
    }

    #[tokio::test]
    async fn test_stale_responses_are_discarded() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

        client.submit(records(), params()).await.unwrap();
        let mut only_bob = params();
        only_bob.selected_users = BTreeSet::from(["bob".to_string()]);
        client.submit(records(), only_bob).await.unwrap();

        let result = client.next_latest().await.expect("latest result");
        assert_eq!(result.series.len(), 1);
        assert_eq!(result.series[0].name, "bob");

        handle.abort();
    }

    #[tokio::test]
    async fn test_error_response_surfaces_and_worker_recovers() {
        let worker = AggregationWorker::default().with_processor(panics_on_mallory);
        let (mut client, handle) = AggregationClient::spawn(worker);

        let err = client
            .aggregate(vec![UsageRecord::new("mallory", "2024-01-02", 1)], params())
            .await
            .unwrap_err();
        match err {
            TrafficError::Processing(msg) => assert_eq!(msg, "cannot aggregate mallory"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.last_error().unwrap().contains("cannot aggregate mallory"));

        let result = client.aggregate(records(), params()).await.unwrap();
        assert_eq!(result.total_usage, 1000);
        assert!(client.last_error().is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn test_rapid_resubmits_resolve_to_latest() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

        let run = async {
            let mut last = 0;
            for n in 1..=40u64 {
                let mut p = params();
                p.min_traffic_threshold = n;
                last = client.submit(records(), p).await?;
            }
            client.next_latest().await.map(|result| (last, result))
        };

        let (last, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("rapid resubmits stalled")
            .expect("aggregation failed");

        assert_eq!(last, 40);
        assert_eq!(result.total_usage, 1000);
        assert!(client.pending_request().is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn test_submit_drops_responses_already_received() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());

        client.submit(records(), params()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut only_bob = params();
        only_bob.selected_users = BTreeSet::from(["bob".to_string()]);
        client.submit(records(), only_bob).await.unwrap();
        assert!(client.responses.try_recv().is_err());

        let result = client.next_latest().await.expect("latest result");
        assert_eq!(result.series.len(), 1);
        assert_eq!(result.series[0].name, "bob");

        handle.abort();
    }

    #[tokio::test]
    async fn test_next_latest_without_request() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());
        assert!(matches!(
            client.next_latest().await,
            Err(TrafficError::Processing(_))
        ));
        handle.abort();
    }

    #[tokio::test]
    async fn test_aborted_worker_reports_closed() {
        let (mut client, handle) = AggregationClient::spawn(AggregationWorker::default());
        handle.abort();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = client.aggregate(records(), params()).await.unwrap_err();
        assert!(matches!(err, TrafficError::WorkerClosed));
    }
}
