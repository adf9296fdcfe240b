//! Per-connection polling and push.
//!
//! Every connected client gets its own [`Session`](session::Session) holding
//! one [`SportPoller`](poller::SportPoller) per configured sport. Pollers
//! publish through a shared [`Broadcaster`] addressed at their own session
//! only.

pub mod broadcaster;
pub mod poller;
pub mod session;

#[cfg(test)]
pub mod testutil;

pub use broadcaster::{Broadcaster, ChannelRegistry, SessionId};
pub use session::SessionOrchestrator;
