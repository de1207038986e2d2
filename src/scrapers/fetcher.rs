use super::transport::Transport;
use crate::errors::FetchFailure;
use crate::models::{CookieSet, EndpointRequest, FetchOutcome};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Fans a batch of GETs out over one transport and one cookie set.
///
/// Outcomes come back in request order; a failed endpoint never aborts the batch.
pub struct FetchOrchestrator {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
}

impl FetchOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub async fn fetch_one(&self, request: &EndpointRequest, cookies: &CookieSet) -> FetchOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return FetchOutcome::Failure(FetchFailure::Transport("fetch pool closed".to_string())),
        };

        debug!("GET {} ({})", request.url, request.key);
        let outcome = match tokio::time::timeout(request.timeout, self.transport.get(request, cookies)).await {
            Ok(result) => FetchOutcome::from(result),
            Err(_) => FetchOutcome::Failure(FetchFailure::Timeout(request.timeout)),
        };

        if let FetchOutcome::Failure(reason) = &outcome {
            warn!("Fetch {} failed: {}", request.key, reason);
        }
        outcome
    }

    pub async fn fetch_many(&self, requests: &[EndpointRequest], cookies: Arc<CookieSet>) -> Vec<FetchOutcome> {
        let outcomes = join_all(requests.iter().map(|request| self.fetch_one(request, &cookies))).await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!("Fetched {}/{} endpoints", succeeded, requests.len());
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use reqwest::header::HeaderMap;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replies with `{"url": ..}` after a per-URL delay, tracking peak concurrency.
    struct DelayedTransport {
        delays: HashMap<String, Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DelayedTransport {
        fn new(delays: &[(&str, u64)]) -> Self {
            Self {
                delays: delays
                    .iter()
                    .map(|(url, ms)| (url.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for DelayedTransport {
        async fn get(&self, request: &EndpointRequest, _cookies: &CookieSet) -> Result<Value, FetchFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delays.get(&request.url).copied().unwrap_or_default()).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if request.url == "status" {
                return Err(FetchFailure::Status(503));
            }
            Ok(json!({ "url": request.url }))
        }
    }

    fn request(url: &str, timeout_ms: u64) -> EndpointRequest {
        EndpointRequest::new(url, url, HeaderMap::new(), Duration::from_millis(timeout_ms))
    }

    fn cookies() -> Arc<CookieSet> {
        Arc::new(CookieSet::new(BTreeMap::new(), Utc::now(), Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn outcomes_follow_request_order() {
        let transport = Arc::new(DelayedTransport::new(&[("a", 120), ("b", 60), ("c", 0)]));
        let fetcher = FetchOrchestrator::new(transport, 8);
        let requests = vec![request("a", 1000), request("b", 1000), request("c", 1000)];

        let outcomes = fetcher.fetch_many(&requests, cookies()).await;
        assert_eq!(outcomes.len(), 3);
        for (outcome, req) in outcomes.iter().zip(&requests) {
            assert_eq!(outcome.payload().unwrap()["url"], req.url.as_str());
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_alone() {
        let transport = Arc::new(DelayedTransport::new(&[("a", 0), ("slow", 500), ("c", 0)]));
        let fetcher = FetchOrchestrator::new(transport, 8);
        let requests = vec![request("a", 1000), request("slow", 50), request("c", 1000)];

        let outcomes = fetcher.fetch_many(&requests, cookies()).await;
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1], FetchOutcome::Failure(FetchFailure::Timeout(Duration::from_millis(50))));
        assert!(outcomes[2].is_success());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let urls: Vec<String> = (0..10).map(|i| format!("u{}", i)).collect();
        let delays: Vec<(&str, u64)> = urls.iter().map(|u| (u.as_str(), 30)).collect();
        let transport = Arc::new(DelayedTransport::new(&delays));
        let fetcher = FetchOrchestrator::new(transport.clone(), 3);
        let requests: Vec<EndpointRequest> = urls.iter().map(|u| request(u, 1000)).collect();

        let outcomes = fetcher.fetch_many(&requests, cookies()).await;
        assert!(outcomes.iter().all(FetchOutcome::is_success));
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failures_are_data() {
        let fetcher = FetchOrchestrator::new(Arc::new(DelayedTransport::new(&[])), 2);
        let outcome = fetcher.fetch_one(&request("status", 1000), &cookies()).await;
        assert_eq!(outcome, FetchOutcome::Failure(FetchFailure::Status(503)));

        let empty = fetcher.fetch_many(&[], cookies()).await;
        assert!(empty.is_empty());
    }
}
