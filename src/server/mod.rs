use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, warn};

use crate::relay::{ChannelRegistry, SessionId, SessionOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub registry: Arc<ChannelRegistry>,
    /// Per-client outbound queue size
    pub channel_capacity: usize,
}

/// Build the router: page routes, static assets, 404 page and the `/ws`
/// push channel.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_handler))
        .route_service("/", ServeFile::new(static_dir.join("index.html")));

    for sport in state.orchestrator.sports() {
        let page = static_dir.join(&sport.tag).join("index.html");
        app = app.route_service(&format!("/{}", sport.tag), ServeFile::new(page));
    }

    #[cfg(test)]
    {
        app = app.route("/panic", get(tests::panicking_handler));
    }

    let not_found = ServeFile::new(static_dir.join("404.html"));
    app.fallback_service(ServeDir::new(static_dir).not_found_service(not_found))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Server error: {}", detail);
    (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.").into_response()
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client connection: register its push channel, start its
/// pollers, forward frames until either side closes, then tear down.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let Some((session, mut rx)) = ClientSession::open(state) else {
        return;
    };
    let id = session.id.clone();

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    debug!("[{}] send failed: {}", id, e);
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("[{}] socket error: {}", id, e);
                        break;
                    }
                    // Clients only listen; anything they send is ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    session.close().await;
}

/// A connected client's push channel and poller group.
///
/// [`ClientSession::close`] unregisters the channel and waits for every
/// poller to stop. If the connection task is dropped before that, the same
/// teardown runs on a spawned task.
struct ClientSession {
    id: SessionId,
    state: Arc<AppState>,
    closed: bool,
}

impl ClientSession {
    /// Register a fresh push channel and start the pollers for it.
    fn open(state: Arc<AppState>) -> Option<(Self, mpsc::Receiver<Arc<String>>)> {
        // Room for every sport's immediate first publish
        let capacity = state
            .channel_capacity
            .max(state.orchestrator.sports().count());
        let (tx, rx) = mpsc::channel::<Arc<String>>(capacity);

        // The channel must exist before the pollers' immediate first publish.
        let id = loop {
            let id = SessionId::generate();
            if state.registry.register(id.clone(), tx.clone()) {
                break id;
            }
        };
        drop(tx);

        if let Err(e) = state.orchestrator.on_connect(&id) {
            warn!("Rejecting connection: {}", e);
            state.registry.unregister(&id);
            return None;
        }
        debug!("[{}] push channel open ({} client(s))", id, state.registry.len());

        let session = ClientSession {
            id,
            state,
            closed: false,
        };
        Some((session, rx))
    }

    async fn close(mut self) {
        self.closed = true;
        self.state.registry.unregister(&self.id);
        self.state.orchestrator.on_disconnect(&self.id).await;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.state.registry.unregister(&self.id);
        let id = self.id.clone();
        let state = Arc::clone(&self.state);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    state.orchestrator.on_disconnect(&id).await;
                });
            }
            Err(_) => warn!("[{}] dropped outside the runtime; left for shutdown", id),
        }
    }
}
