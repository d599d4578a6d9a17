use std::sync::Arc;

use serde::Serialize;

use crate::pairing::UserId;

pub mod router;
pub mod state;

pub type Sender<T> = tokio::sync::mpsc::UnboundedSender<T>;

/// Pre-encoded JSON text frame, shared across a user's connections.
pub type Outbound = Arc<str>;

/// Transport-level frames sent to a single socket, never relayed.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum Notice {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
