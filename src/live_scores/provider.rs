use async_trait::async_trait;

use super::ScoreEvent;
use crate::error::UpstreamError;

/// Trait that every upstream scoreboard source must implement.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Issue exactly one request to `endpoint` and return its events.
    async fn fetch(&self, endpoint: &str) -> Result<Vec<ScoreEvent>, UpstreamError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Merged result of fetching every endpoint of one sport.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Events from the endpoints that succeeded, in endpoint order
    pub events: Vec<ScoreEvent>,
    pub succeeded: usize,
    pub failures: Vec<UpstreamError>,
}

impl FetchOutcome {
    /// True when no endpoint produced a usable response.
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && !self.failures.is_empty()
    }
}

/// Fetch all endpoints concurrently. A failing endpoint is recorded in
/// `failures` and never discards events from the others.
pub async fn fetch_all(fetcher: &dyn UpstreamFetcher, endpoints: &[String]) -> FetchOutcome {
    let results =
        futures_util::future::join_all(endpoints.iter().map(|ep| fetcher.fetch(ep))).await;

    let mut outcome = FetchOutcome::default();
    for result in results {
        match result {
            Ok(events) => {
                outcome.succeeded += 1;
                outcome.events.extend(events);
            }
            Err(e) => outcome.failures.push(e),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testutil::{live_event, pre_event, ScriptedFetcher};

    fn endpoints(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_concatenates_in_endpoint_order() {
        let fetcher = ScriptedFetcher::new()
            .always("usa", vec![live_event("u1")])
            .always("eng", vec![live_event("e1"), pre_event("e2")]);

        let outcome = fetch_all(&fetcher, &endpoints(&["usa", "eng"])).await;
        assert_eq!(outcome.succeeded, 2);
        assert!(outcome.failures.is_empty());
        let ids: Vec<&str> = outcome.events.iter().map(|e| e.0["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["u1", "e1", "e2"]);
    }

    #[tokio::test]
    async fn test_one_failing_endpoint_keeps_the_rest() {
        let fetcher = ScriptedFetcher::new()
            .always("usa", vec![live_event("1"), live_event("2"), live_event("3")])
            .always_timeout("eng");

        let outcome = fetch_all(&fetcher, &endpoints(&["usa", "eng"])).await;
        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0], UpstreamError::Timeout { .. }));
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn test_all_failed() {
        let fetcher = ScriptedFetcher::new().always_timeout("a").always_timeout("b");
        let outcome = fetch_all(&fetcher, &endpoints(&["a", "b"])).await;
        assert!(outcome.all_failed());
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_empty_success_is_not_failure() {
        let fetcher = ScriptedFetcher::new()
            .always("a", vec![])
            .always_timeout("b");
        let outcome = fetch_all(&fetcher, &endpoints(&["a", "b"])).await;
        assert!(!outcome.all_failed());
    }
}
