//! Turns pairing outcomes into events and forwards session content between
//! linked partners.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::pairing::{Pairing, PairingOutcome, PairingTable, UserId};
use crate::utils::event::{Event, SignalKind};

/// Outbound delivery capability. Implementations are fire-and-forget: a
/// target that cannot be reached is the transport's problem.
pub trait Notifier: Send + Sync {
    fn deliver(&self, target: &UserId, event: Event);

    /// Consulted while popping the waiting queue. Runs under the pairing
    /// lock, so it must be cheap and must not touch the table.
    fn is_reachable(&self, _user: &UserId) -> bool {
        true
    }
}

/// What happened to the event(s) an action produced.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Content handed to the partner's transport.
    Delivered,
    /// No partner, or nothing to send.
    Dropped,
    /// A control action; lifecycle events went out.
    Notified,
}

/// Session content relayed verbatim to the partner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Chat(String),
    Typing,
    Signal { kind: SignalKind, body: Value },
}

pub struct SessionRelay<N> {
    table: PairingTable,
    notifier: N,
}

impl<N: Notifier> SessionRelay<N> {
    pub fn new(table: PairingTable, notifier: N) -> Self {
        Self { table, notifier }
    }

    pub fn table(&self) -> &PairingTable {
        &self.table
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Enter matchmaking. A previous partner is told `partnerLeft`.
    pub fn find_partner(&self, user: &UserId) -> PairingOutcome {
        self.pair(user, Event::PartnerLeft)
    }

    /// Leave the current partner and go straight back into matchmaking.
    /// The abandoned partner is told `partnerSkipped`.
    pub fn skip(&self, user: &UserId) -> PairingOutcome {
        self.pair(user, Event::PartnerSkipped)
    }

    fn pair(&self, user: &UserId, departure: Event) -> PairingOutcome {
        let outcome = self
            .table
            .request_pairing_with(user, |u| self.notifier.is_reachable(u));

        for gone in &outcome.evicted {
            info!("evicted unreachable user {} from the waiting queue", gone);
        }
        // the abandoned peer hears about it before anyone hears about a new pair
        if let Some(old) = &outcome.abandoned {
            debug!("{} left {}", user, old);
            self.notifier.deliver(old, departure);
        }
        match &outcome.pairing {
            Pairing::Waiting => {
                debug!("{} is waiting", user);
                self.notifier.deliver(user, Event::Waiting);
            }
            Pairing::Paired { partner, initiator } => {
                info!("paired {} <-> {}, initiator {}", user, partner, initiator);
                self.notifier.deliver(
                    user,
                    Event::PartnerFound {
                        partner_id: partner.clone(),
                        initiator: initiator.clone(),
                    },
                );
                self.notifier.deliver(
                    partner,
                    Event::PartnerFound {
                        partner_id: user.clone(),
                        initiator: initiator.clone(),
                    },
                );
            }
        }
        outcome
    }

    /// Relay `content` to the current partner, or drop it.
    pub fn forward(&self, user: &UserId, content: Content) -> Delivery {
        let Some(partner) = self.table.current_partner(user) else {
            debug!("dropped content from unpaired user {}", user);
            return Delivery::Dropped;
        };
        let event = match content {
            Content::Chat(text) => Event::ChatMessage { text },
            Content::Typing => Event::Typing,
            Content::Signal { kind, body } => {
                debug!("signal {:?} from {} to {}", kind, user, partner);
                Event::Signal {
                    kind,
                    from: user.clone(),
                    body,
                }
            }
        };
        self.notifier.deliver(&partner, event);
        Delivery::Delivered
    }

    /// Leave matchmaking entirely. Always answers the caller with `stopped`.
    pub fn stop(&self, user: &UserId) -> Delivery {
        if let Some(partner) = self.table.detach(user) {
            self.notifier.deliver(&partner, Event::PartnerLeft);
        }
        self.notifier.deliver(user, Event::Stopped);
        Delivery::Notified
    }

    /// Transport lost `user`. Nothing is sent to `user`.
    pub fn disconnect(&self, user: &UserId) -> Option<UserId> {
        let partner = self.table.detach(user)?;
        info!("{} disconnected, notifying {}", user, partner);
        self.notifier.deliver(&partner, Event::PartnerLeft);
        Some(partner)
    }

    /// Like [`disconnect`](Self::disconnect), but only if `user` is still
    /// unreachable when the table lock is taken. A user who reconnected
    /// after their last connection closed keeps their session.
    pub fn disconnect_if_gone(&self, user: &UserId) -> Option<UserId> {
        let partner = self
            .table
            .detach_if(user, |u| !self.notifier.is_reachable(u))?;
        info!("{} disconnected, notifying {}", user, partner);
        self.notifier.deliver(&partner, Event::PartnerLeft);
        Some(partner)
    }
}
