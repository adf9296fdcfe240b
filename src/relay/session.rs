use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::broadcaster::{Broadcaster, SessionId};
use super::poller::{PollerHandle, SportPoller};
use crate::error::SessionError;
use crate::live_scores::{SportConfig, UpstreamFetcher};

/// Server-side record of one connected client and the pollers it owns.
///
/// The pollers are released as a group: [`Session::close`] cancels and
/// awaits them, and dropping the session on any other path cancels them
/// through their handles.
pub struct Session {
    id: SessionId,
    connected_at: DateTime<Utc>,
    pollers: Vec<PollerHandle>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Session {
            id,
            connected_at: Utc::now(),
            pollers: Vec::new(),
        }
    }

    pub fn poller_count(&self) -> usize {
        self.pollers.len()
    }

    /// Cancel every poller and wait for all of them to stop.
    /// Returns how many were released.
    pub async fn close(mut self) -> usize {
        let handles: Vec<PollerHandle> = self.pollers.drain(..).collect();
        let released = handles.len();
        debug!("[{}] releasing {} poller(s)", self.id, released);
        futures_util::future::join_all(handles.into_iter().map(PollerHandle::cancel)).await;
        released
    }
}

/// Starts one poller per configured sport for every connecting client and
/// tears all of them down when the client leaves.
pub struct SessionOrchestrator {
    sports: Vec<Arc<SportConfig>>,
    fetcher: Arc<dyn UpstreamFetcher>,
    broadcaster: Arc<dyn Broadcaster>,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionOrchestrator {
    pub fn new(
        sports: Vec<SportConfig>,
        fetcher: Arc<dyn UpstreamFetcher>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        SessionOrchestrator {
            sports: sports.into_iter().map(Arc::new).collect(),
            fetcher,
            broadcaster,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn sports(&self) -> impl Iterator<Item = &SportConfig> {
        self.sports.iter().map(|s| s.as_ref())
    }

    /// Start polling every sport for `id`. Each poller fetches immediately.
    /// Must be called from within a tokio runtime.
    pub fn on_connect(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyConnected(id.to_string()));
        }

        let mut session = Session::new(id.clone());
        for sport in &self.sports {
            let poller = SportPoller::new(
                Arc::clone(sport),
                id.clone(),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.broadcaster),
            );
            session.pollers.push(poller.spawn());
        }
        info!(
            "Session {} connected: polling {} sport(s)",
            id,
            session.poller_count()
        );
        sessions.insert(id.clone(), session);
        Ok(())
    }

    /// Cancel all of `id`'s pollers and forget the session. Returns once
    /// every poller task has exited; unknown ids are a no-op.
    pub async fn on_disconnect(&self, id: &SessionId) -> bool {
        let session = self.lock().remove(id);
        let Some(session) = session else {
            debug!("Disconnect for unknown session {}", id);
            return false;
        };

        let lifetime = Utc::now() - session.connected_at;
        let released = session.close().await;
        info!(
            "Session {} disconnected after {}s: released {} poller(s)",
            id,
            lifetime.num_seconds(),
            released
        );
        true
    }

    /// Tear down every session, e.g. on process shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<Session> = self.lock().drain().map(|(_, s)| s).collect();
        if sessions.is_empty() {
            return;
        }
        info!("Closing {} session(s)", sessions.len());
        futures_util::future::join_all(sessions.into_iter().map(Session::close)).await;
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Poller handles currently owned by connected sessions.
    pub fn active_pollers(&self) -> usize {
        self.lock().values().map(Session::poller_count).sum()
    }

    /// Sport tag and state of each poller of `id`.
    #[cfg(test)]
    pub fn poller_states(
        &self,
        id: &SessionId,
    ) -> Option<Vec<(String, super::poller::PollerState)>> {
        self.lock().get(id).map(|s| {
            s.pollers
                .iter()
                .map(|p| (p.sport().to_string(), p.state()))
                .collect()
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
