//! In-memory fakes for exercising pollers and sessions without a network.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use super::broadcaster::{Broadcaster, Target};
use crate::error::{BroadcastError, UpstreamError};
use crate::live_scores::{ScoreEvent, UpstreamFetcher};

pub fn live_event(id: &str) -> ScoreEvent {
    ScoreEvent(json!({"id": id, "status": {"type": {"state": "in"}}}))
}

pub fn pre_event(id: &str) -> ScoreEvent {
    ScoreEvent(json!({"id": id, "status": {"type": {"state": "pre"}}}))
}

enum Script {
    /// Replies in order; the last one repeats. `None` is a timeout.
    Sequence(Vec<Option<Vec<ScoreEvent>>>),
    /// Blocks until `release()` is called.
    Gated(Vec<ScoreEvent>),
}

/// Upstream fake with a per-endpoint script and call accounting.
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
    gate: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        ScriptedFetcher {
            scripts: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            latency: None,
            gate: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always(self, endpoint: &str, events: Vec<ScoreEvent>) -> Self {
        self.sequence(endpoint, vec![Some(events)])
    }

    pub fn always_timeout(self, endpoint: &str) -> Self {
        self.sequence(endpoint, vec![None])
    }

    pub fn sequence(mut self, endpoint: &str, replies: Vec<Option<Vec<ScoreEvent>>>) -> Self {
        self.scripts
            .insert(endpoint.to_string(), Script::Sequence(replies));
        self
    }

    pub fn gated(mut self, endpoint: &str, events: Vec<ScoreEvent>) -> Self {
        self.scripts
            .insert(endpoint.to_string(), Script::Gated(events));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Let every gated fetch currently waiting complete.
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn timeout(endpoint: &str) -> UpstreamError {
        UpstreamError::Timeout {
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<ScoreEvent>, UpstreamError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(endpoint.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = match self.scripts.get(endpoint) {
            None => Err(Self::timeout(endpoint)),
            Some(Script::Sequence(replies)) => {
                let idx = (call - 1).min(replies.len().saturating_sub(1));
                match replies.get(idx).cloned().flatten() {
                    Some(events) => Ok(events),
                    None => Err(Self::timeout(endpoint)),
                }
            }
            Some(Script::Gated(events)) => {
                self.gate.notified().await;
                Ok(events.clone())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone)]
pub struct Published {
    /// `None` for fan-out
    pub session: Option<String>,
    pub event: String,
    pub payload: Value,
}

/// Broadcaster that records every publish and always succeeds.
#[derive(Default)]
pub struct RecordingBroadcaster {
    published: Mutex<Vec<Published>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.event == event)
            .count()
    }

    pub fn count_for(&self, session: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.session.as_deref() == Some(session))
            .count()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(
        &self,
        target: Target<'_>,
        event: &str,
        payload: &Value,
    ) -> Result<usize, BroadcastError> {
        let session = match target {
            Target::Session(id) => Some(id.to_string()),
            Target::All => None,
        };
        self.published.lock().unwrap().push(Published {
            session,
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(1)
    }
}
