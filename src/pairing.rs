//! Waiting queue and partner table.
//!
//! Every mutation goes through one mutex so that the cleanup, the pop of
//! the queue head and the link are observed as a single step. The lock is
//! never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{Error, Result};

/// Opaque participant identifier chosen by the client.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidArgument("userId required"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pairing {
    /// Caller was appended to the tail of the queue.
    Waiting,
    /// Caller was linked to the former queue head. The peer that was
    /// waiting is always the initiator.
    Paired { partner: UserId, initiator: UserId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingOutcome {
    pub user: UserId,
    /// Partner dropped by the cleanup step; must be told before any new
    /// pairing event goes out.
    pub abandoned: Option<UserId>,
    pub pairing: Pairing,
    /// Queue entries discarded because they were no longer reachable.
    pub evicted: Vec<UserId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub waiting: usize,
    pub sessions: usize,
}

#[derive(Debug, Default)]
struct Inner {
    waiting: VecDeque<UserId>,
    partners: HashMap<UserId, UserId>,
}

impl Inner {
    fn detach(&mut self, user: &UserId) -> Option<UserId> {
        if let Some(pos) = self.waiting.iter().position(|u| u == user) {
            self.waiting.remove(pos);
        }
        let partner = self.partners.remove(user)?;
        self.partners.remove(&partner);
        Some(partner)
    }

    fn link(&mut self, a: &UserId, b: &UserId) {
        self.partners.insert(a.clone(), b.clone());
        self.partners.insert(b.clone(), a.clone());
    }
}

#[derive(Debug, Default)]
pub struct PairingTable {
    inner: Mutex<Inner>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pair `user` with the queue head, or queue them. Every queued user is
    /// treated as reachable.
    pub fn request_pairing(&self, user: &UserId) -> PairingOutcome {
        self.request_pairing_with(user, |_| true)
    }

    /// Same as [`request_pairing`](Self::request_pairing), but queue heads
    /// for which `is_live` returns false are discarded and the next head is
    /// tried. At most the entries queued when the call started are visited.
    ///
    /// `is_live` runs under the table lock and must not call back into it.
    pub fn request_pairing_with<F>(&self, user: &UserId, is_live: F) -> PairingOutcome
    where
        F: Fn(&UserId) -> bool,
    {
        let mut inner = self.lock();
        let abandoned = inner.detach(user);

        let mut evicted = Vec::new();
        let mut pairing = Pairing::Waiting;
        for _ in 0..inner.waiting.len() {
            let Some(candidate) = inner.waiting.pop_front() else {
                break;
            };
            if is_live(&candidate) {
                inner.link(user, &candidate);
                pairing = Pairing::Paired {
                    partner: candidate.clone(),
                    initiator: candidate,
                };
                break;
            }
            evicted.push(candidate);
        }
        if pairing == Pairing::Waiting {
            inner.waiting.push_back(user.clone());
        }

        PairingOutcome {
            user: user.clone(),
            abandoned,
            pairing,
            evicted,
        }
    }

    /// Remove `user` from the queue and from any link. Returns the former
    /// partner, if there was one.
    pub fn detach(&self, user: &UserId) -> Option<UserId> {
        self.lock().detach(user)
    }

    /// Detach `user` only if `gone` still holds once the lock is taken.
    /// Lets a transport re-check liveness atomically with the detach, so a
    /// user who reconnected in the meantime keeps their link.
    pub fn detach_if<F>(&self, user: &UserId, gone: F) -> Option<UserId>
    where
        F: FnOnce(&UserId) -> bool,
    {
        let mut inner = self.lock();
        if !gone(user) {
            return None;
        }
        inner.detach(user)
    }

    pub fn current_partner(&self, user: &UserId) -> Option<UserId> {
        self.lock().partners.get(user).cloned()
    }

    #[cfg(test)]
    pub(crate) fn is_waiting(&self, user: &UserId) -> bool {
        self.lock().waiting.contains(user)
    }

    pub fn stats(&self) -> Stats {
        let inner = self.lock();
        Stats {
            waiting: inner.waiting.len(),
            sessions: inner.partners.len() / 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn assert_consistent(table: &PairingTable) {
        let inner = table.lock();
        for (a, b) in &inner.partners {
            assert_ne!(a, b, "{a} linked to itself");
            assert_eq!(inner.partners.get(b), Some(a), "link {a} -> {b} is one-sided");
            assert!(!inner.waiting.contains(a), "{a} is both linked and queued");
        }
        let unique: HashSet<_> = inner.waiting.iter().collect();
        assert_eq!(unique.len(), inner.waiting.len(), "duplicate queue entry");
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert_eq!(
            UserId::new(""),
            Err(Error::InvalidArgument("userId required"))
        );
        assert!(UserId::new("   ").is_err());
        assert_eq!(uid("abc").as_str(), "abc");
    }

    #[test]
    fn test_first_waits_second_pairs_with_waiting_initiator() {
        let table = PairingTable::new();
        let first = table.request_pairing(&uid("u1"));
        assert_eq!(first.pairing, Pairing::Waiting);
        assert!(table.is_waiting(&uid("u1")));

        let second = table.request_pairing(&uid("u2"));
        assert_eq!(
            second.pairing,
            Pairing::Paired {
                partner: uid("u1"),
                initiator: uid("u1"),
            }
        );
        assert_eq!(table.current_partner(&uid("u1")), Some(uid("u2")));
        assert_eq!(table.current_partner(&uid("u2")), Some(uid("u1")));
        assert!(!table.is_waiting(&uid("u1")));
        assert_consistent(&table);
    }

    #[test]
    fn test_fifo_order() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        table.request_pairing(&uid("b"));
        table.request_pairing(&uid("c"));

        assert_eq!(table.current_partner(&uid("a")), Some(uid("b")));
        assert!(table.is_waiting(&uid("c")));
        assert_eq!(
            table.stats(),
            Stats {
                waiting: 1,
                sessions: 1
            }
        );
    }

    #[test]
    fn test_repeat_request_while_waiting_does_not_duplicate() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        let again = table.request_pairing(&uid("a"));
        assert_eq!(again.pairing, Pairing::Waiting);
        assert_eq!(table.stats().waiting, 1);
        assert_consistent(&table);
    }

    #[test]
    fn test_request_while_paired_abandons_old_partner() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        table.request_pairing(&uid("b"));

        let outcome = table.request_pairing(&uid("b"));
        assert_eq!(outcome.abandoned, Some(uid("a")));
        assert_eq!(outcome.pairing, Pairing::Waiting);
        assert_eq!(table.current_partner(&uid("a")), None);
        assert!(!table.is_waiting(&uid("a")));
        assert!(table.is_waiting(&uid("b")));
        assert_consistent(&table);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        table.request_pairing(&uid("b"));

        assert_eq!(table.detach(&uid("a")), Some(uid("b")));
        assert_eq!(table.detach(&uid("a")), None);
        assert_eq!(table.current_partner(&uid("a")), None);
        assert_eq!(table.current_partner(&uid("b")), None);
        assert_eq!(table.stats(), Stats::default());
    }

    #[test]
    fn test_detach_removes_from_queue() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        assert_eq!(table.detach(&uid("a")), None);
        assert!(!table.is_waiting(&uid("a")));

        let next = table.request_pairing(&uid("b"));
        assert_eq!(next.pairing, Pairing::Waiting);
    }

    #[test]
    fn test_detach_if_checks_under_lock() {
        let table = PairingTable::new();
        table.request_pairing(&uid("a"));
        table.request_pairing(&uid("b"));

        assert_eq!(table.detach_if(&uid("a"), |_| false), None);
        assert_eq!(table.current_partner(&uid("b")), Some(uid("a")));

        assert_eq!(table.detach_if(&uid("a"), |_| true), Some(uid("b")));
        assert_eq!(table.current_partner(&uid("b")), None);

        table.request_pairing(&uid("c"));
        assert_eq!(table.detach_if(&uid("c"), |_| true), None);
        assert!(!table.is_waiting(&uid("c")));
        assert_consistent(&table);
    }

    #[test]
    fn test_unreachable_head_is_evicted() {
        let table = PairingTable::new();
        table.request_pairing(&uid("dead"));

        let outcome = table.request_pairing_with(&uid("live"), |u| u != &uid("dead"));
        assert_eq!(outcome.evicted, vec![uid("dead")]);
        assert_eq!(outcome.pairing, Pairing::Waiting);
        assert!(!table.is_waiting(&uid("dead")));
        assert!(table.is_waiting(&uid("live")));

        let next = table.request_pairing(&uid("next"));
        assert_eq!(
            next.pairing,
            Pairing::Paired {
                partner: uid("live"),
                initiator: uid("live"),
            }
        );
        assert_consistent(&table);
    }

    #[test]
    fn test_caller_is_queued_when_every_head_is_dead() {
        let table = PairingTable::new();
        {
            let mut inner = table.lock();
            inner.waiting.extend([uid("d1"), uid("d2"), uid("ok")]);
        }
        let outcome = table.request_pairing_with(&uid("me"), |u| u == &uid("ok"));
        assert_eq!(outcome.evicted, vec![uid("d1"), uid("d2")]);
        assert_eq!(
            outcome.pairing,
            Pairing::Paired {
                partner: uid("ok"),
                initiator: uid("ok"),
            }
        );

        {
            let mut inner = table.lock();
            inner.waiting.extend([uid("d3"), uid("d4")]);
        }
        let calls = std::cell::Cell::new(0);
        let outcome = table.request_pairing_with(&uid("you"), |_| {
            calls.set(calls.get() + 1);
            false
        });
        assert_eq!(calls.get(), 2);
        assert_eq!(outcome.pairing, Pairing::Waiting);
        assert_eq!(outcome.evicted, vec![uid("d3"), uid("d4")]);
        assert!(table.is_waiting(&uid("you")));
        assert_eq!(table.stats().waiting, 1);
        assert_consistent(&table);
    }

    #[test]
    fn test_concurrent_requests_pair_everyone_once() {
        const N: usize = 101;
        let table = PairingTable::new();
        let outcomes: Vec<PairingOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|i| {
                    let table = &table;
                    s.spawn(move || table.request_pairing(&uid(&format!("u{i}"))))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(
            table.stats(),
            Stats {
                waiting: N % 2,
                sessions: N / 2
            }
        );

        let mut seen = HashSet::new();
        for outcome in &outcomes {
            assert_eq!(outcome.abandoned, None);
            if let Pairing::Paired { partner, initiator } = &outcome.pairing {
                assert_eq!(partner, initiator);
                assert!(seen.insert(outcome.user.clone()), "{} paired twice", outcome.user);
                assert!(seen.insert(partner.clone()), "{partner} paired twice");
            }
        }
        assert_eq!(seen.len(), (N / 2) * 2);
        assert_consistent(&table);
    }

    #[test]
    fn test_concurrent_churn_keeps_links_symmetric() {
        let table = PairingTable::new();
        std::thread::scope(|s| {
            for t in 0..8 {
                let table = &table;
                s.spawn(move || {
                    for round in 0..200 {
                        let me = uid(&format!("t{t}-{}", round % 5));
                        match round % 3 {
                            0 | 1 => {
                                table.request_pairing(&me);
                            }
                            _ => {
                                table.detach(&me);
                            }
                        }
                    }
                });
            }
        });
        assert_consistent(&table);
    }
}
