//! One recurring fetch-filter-publish loop for one sport of one session.
//!
//! ```text
//!   Idle ──spawn──▶ Running ──cancel──▶ Cancelled
//!                    │  ▲
//!                    ▼  │ tick: fetch_all → filter_live → publish
//! ```
//!
//! The first tick fires immediately. Ticks never overlap: the next one is
//! scheduled only once the current fetch has resolved, and a tick that
//! overruns the interval delays the cadence instead of bursting.

use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use super::broadcaster::{Broadcaster, SessionId, Target};
use crate::live_scores::{fetch_all, filter_live, FetchOutcome, SportConfig, UpstreamFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Cancelled,
}

impl PollerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PollerState::Idle,
            1 => PollerState::Running,
            _ => PollerState::Cancelled,
        }
    }
}

/// Owned handle to a running poller.
///
/// Dropping the handle cancels the poller; [`PollerHandle::cancel`] also
/// waits for its task to exit. Either way it happens once: both consume
/// the handle.
pub struct PollerHandle {
    sport: String,
    state: Arc<AtomicU8>,
    guard: DropGuard,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn sport(&self) -> &str {
        &self.sport
    }

    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Cancel the poller and wait until its task has finished. An in-flight
    /// fetch is dropped and nothing more is published.
    pub async fn cancel(self) {
        let PollerHandle {
            sport,
            state,
            guard,
            task,
        } = self;
        state.store(PollerState::Cancelled as u8, Ordering::Release);
        drop(guard);
        if let Err(e) = task.await {
            if e.is_panic() {
                warn!("Poller for {} panicked: {}", sport, e);
            }
        }
    }
}

pub struct SportPoller {
    sport: Arc<SportConfig>,
    session: SessionId,
    fetcher: Arc<dyn UpstreamFetcher>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl SportPoller {
    pub fn new(
        sport: Arc<SportConfig>,
        session: SessionId,
        fetcher: Arc<dyn UpstreamFetcher>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        SportPoller {
            sport,
            session,
            fetcher,
            broadcaster,
        }
    }

    /// Start the poller on the current runtime.
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(PollerState::Idle as u8));
        let sport = self.sport.tag.clone();
        let task = tokio::spawn(self.run(cancel.clone(), Arc::clone(&state)));
        PollerHandle {
            sport,
            state,
            guard: cancel.drop_guard(),
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, state: Arc<AtomicU8>) {
        // Never move back out of Cancelled if cancel() won the race.
        let _ = state.compare_exchange(
            PollerState::Idle as u8,
            PollerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let period = self.sport.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tick += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        "[{}] {} tick {} cancelled mid-fetch, result discarded",
                        self.session, self.sport.tag, tick
                    );
                    break;
                }
                outcome = fetch_all(self.fetcher.as_ref(), &self.sport.endpoints) => outcome,
            };

            if cancel.is_cancelled() {
                break;
            }
            self.publish_tick(tick, outcome);
        }

        state.store(PollerState::Cancelled as u8, Ordering::Release);
        debug!("[{}] {} poller stopped after {} ticks", self.session, self.sport.tag, tick);
    }

    fn publish_tick(&self, tick: u64, outcome: FetchOutcome) {
        for failure in &outcome.failures {
            warn!(
                "[{}] {} tick {}: {} fetch failed: {}",
                self.session,
                self.sport.tag,
                tick,
                self.fetcher.name(),
                failure
            );
        }
        if outcome.all_failed() {
            return;
        }

        let live = filter_live(outcome.events);
        debug!(
            "[{}] {} tick {}: {} live",
            self.session,
            self.sport.tag,
            tick,
            live.len()
        );

        let payload = Value::Array(live.into_iter().map(|ev| ev.0).collect());
        if let Err(e) = self.broadcaster.publish(
            Target::Session(&self.session),
            &self.sport.event_name,
            &payload,
        ) {
            debug!("[{}] {} publish dropped: {}", self.session, self.sport.tag, e);
        }
    }
}
