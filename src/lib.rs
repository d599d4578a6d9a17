//! Anonymous 1:1 matchmaking with a session-scoped event relay.
//!
//! [`pairing::PairingTable`] owns the waiting queue and the partner links;
//! [`relay::SessionRelay`] turns its outcomes into events and forwards chat,
//! typing and WebRTC signaling between linked partners. The socket and HTTP
//! transports in [`ws`] and [`api`] are thin adapters on top.

use std::sync::Arc;

use axum::Router;

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod pairing;
pub mod relay;
pub mod utils;
pub mod ws;

use pairing::PairingTable;
use relay::SessionRelay;
use ws::state::Hub;

/// Process-wide state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<SessionRelay<Hub>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            relay: Arc::new(SessionRelay::new(PairingTable::new(), Hub::new())),
        }
    }

    pub fn hub(&self) -> &Hub {
        self.relay.notifier()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/ws", ws::router::router(state.clone()))
        .nest("/api", api::router(state))
}
