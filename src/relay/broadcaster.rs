use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BroadcastError;

/// Opaque identifier of one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Random 64-bit hex id for a fresh connection.
    pub fn generate() -> Self {
        SessionId::new(format!("{:016x}", rand::random::<u64>()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who receives a published message.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Session(&'a SessionId),
    /// Degraded fan-out to every connected client. Pollers never use it.
    #[allow(dead_code)]
    All,
}

/// Push-channel sink shared by every poller.
///
/// Implementations must not block: publishing happens inside a poller's
/// tick and a slow client must never stall it.
pub trait Broadcaster: Send + Sync {
    /// Publish `payload` under `event`. Returns how many clients it was
    /// handed to.
    fn publish(&self, target: Target<'_>, event: &str, payload: &Value)
        -> Result<usize, BroadcastError>;
}

/// Wire frame sent to browsers as one WebSocket text message.
#[derive(Debug, Serialize)]
pub struct PushFrame<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

/// Registry of live push channels, keyed by session.
///
/// Each entry feeds the WebSocket writer task of one client. Entries are
/// added on connect and removed on disconnect; after removal nothing can be
/// delivered to that client.
#[derive(Default)]
pub struct ChannelRegistry {
    clients: Mutex<HashMap<SessionId, mpsc::Sender<Arc<String>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, leaving the existing channel in place, if `id` is
    /// already registered.
    pub fn register(&self, id: SessionId, tx: mpsc::Sender<Arc<String>>) -> bool {
        match self.lock().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(tx);
                true
            }
        }
    }

    /// Returns `false` if the session was not registered.
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, mpsc::Sender<Arc<String>>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_to(
        id: &SessionId,
        tx: &mpsc::Sender<Arc<String>>,
        frame: Arc<String>,
    ) -> Result<(), BroadcastError> {
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BroadcastError::Lagging(id.to_string()),
            mpsc::error::TrySendError::Closed(_) => BroadcastError::ChannelClosed(id.to_string()),
        })
    }
}

impl Broadcaster for ChannelRegistry {
    fn publish(
        &self,
        target: Target<'_>,
        event: &str,
        payload: &Value,
    ) -> Result<usize, BroadcastError> {
        let frame = match serde_json::to_string(&PushFrame { event, data: payload }) {
            Ok(json) => Arc::new(json),
            // Serializing a serde_json::Value cannot fail in practice
            Err(e) => {
                debug!("Dropping unserializable '{}' frame: {}", event, e);
                return Ok(0);
            }
        };

        let clients = self.lock();
        match target {
            Target::Session(id) => {
                let tx = clients
                    .get(id)
                    .ok_or_else(|| BroadcastError::ChannelClosed(id.to_string()))?;
                Self::send_to(id, tx, frame)?;
                Ok(1)
            }
            Target::All => {
                let mut delivered = 0;
                for (id, tx) in clients.iter() {
                    match Self::send_to(id, tx, Arc::clone(&frame)) {
                        Ok(()) => delivered += 1,
                        Err(e) => debug!("Fan-out skipped: {}", e),
                    }
                }
                Ok(delivered)
            }
        }
    }
}
