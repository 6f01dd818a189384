use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::relay::Relay;
use crate::server::user_connected;

#[derive(Default, Clone)]
pub struct ServerState {
    relay: Relay,
}

impl ServerState {
    #[must_use]
    pub const fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

#[allow(clippy::unused_async)]
async fn health_handler() -> &'static str {
    "OK"
}

#[allow(clippy::unused_async)]
async fn signaling_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| user_connected(socket, state.relay))
}

pub fn create(server_state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(signaling_handler))
        .with_state(server_state)
}
