use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, error};
use uuid::Uuid;

use crate::{pairing::UserId, relay::Notifier, utils::event::Event};

use super::{Outbound, Sender};

struct Connection {
    id: Uuid,
    tx: Sender<Outbound>,
}

/// Live connections per user. Every event addressed to a user is fanned
/// out to all of that user's connections.
#[derive(Default)]
pub struct Hub {
    connections: Mutex<HashMap<UserId, Vec<Connection>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Vec<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, user: &UserId, tx: Sender<Outbound>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock()
            .entry(user.clone())
            .or_default()
            .push(Connection { id, tx });
        id
    }

    /// Returns true when `user` has no connection left.
    pub fn unregister(&self, user: &UserId, id: Uuid) -> bool {
        let mut connections = self.lock();
        let Some(conns) = connections.get_mut(user) else {
            return true;
        };
        conns.retain(|c| c.id != id);
        if conns.is_empty() {
            connections.remove(user);
            return true;
        }
        false
    }

    pub fn connection_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn senders(&self, user: &UserId) -> Vec<Sender<Outbound>> {
        self.lock()
            .get(user)
            .map(|conns| conns.iter().map(|c| c.tx.clone()).collect())
            .unwrap_or_default()
    }
}

impl Notifier for Hub {
    fn deliver(&self, target: &UserId, event: Event) {
        let text: Outbound = match serde_json::to_string(&event) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!("failed to encode {:?}: {}", event, e);
                return;
            }
        };
        let senders = self.senders(target);
        if senders.is_empty() {
            debug!("user {} has no connection, dropping {}", target, text);
        }
        for tx in senders {
            if tx.send(text.clone()).is_err() {
                debug!("connection of {} already closed", target);
            }
        }
    }

    fn is_reachable(&self, user: &UserId) -> bool {
        self.lock().get(user).is_some_and(|conns| !conns.is_empty())
    }
}
