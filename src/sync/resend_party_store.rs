//! Retry-aware work queue of peers awaiting resynchronization.

use crate::types::{Party, SyncableParty};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// A party is dropped for good once it has failed this many consecutive
/// attempts.
pub const MAX_ATTEMPTS: u32 = 20;

#[derive(Default)]
struct Inner {
    queue: VecDeque<SyncableParty>,
    seen: HashSet<String>,
}

/// FIFO queue of [`SyncableParty`] plus a permanent "already seen" set of
/// party urls.
///
/// A party enters the queue at most once per first sighting; re-announcing
/// an already-seen url never re-enqueues it. Only a failure-driven
/// [`increment_failed_attempt`](Self::increment_failed_attempt) (below the
/// attempt cap) or a process restart puts a url back in play. The seen-set
/// is deliberately never evicted for the life of the process, matching the
/// original protocol semantics.
#[derive(Default)]
pub struct ResendPartyStore {
    inner: Mutex<Inner>,
}

impl ResendPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue every party whose url has not been sighted before, and mark
    /// them all as seen.
    pub fn add_unseen_parties(&self, parties: impl IntoIterator<Item = Party>) {
        let mut inner = self.inner.lock();
        for party in parties {
            if inner.seen.insert(party.url.clone()) {
                tracing::debug!("Queueing newly-sighted party {}", party.url);
                inner.queue.push_back(SyncableParty { party, attempts: 0 });
            }
        }
    }

    /// Dequeue the next party to synchronize, if any.
    pub fn get_next_party(&self) -> Option<SyncableParty> {
        self.inner.lock().queue.pop_front()
    }

    /// Record a failed attempt. The party is re-enqueued with an incremented
    /// counter until the attempt cap, then dropped permanently for this
    /// process run.
    pub fn increment_failed_attempt(&self, failed: SyncableParty) {
        if failed.attempts + 1 < MAX_ATTEMPTS {
            let retry = SyncableParty {
                party: failed.party,
                attempts: failed.attempts + 1,
            };
            self.inner.lock().queue.push_back(retry);
        } else {
            tracing::warn!(
                "Giving up on party {} after {} failed attempt(s)",
                failed.party.url,
                failed.attempts + 1
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_enqueues_once() {
        let store = ResendPartyStore::new();
        store.add_unseen_parties([Party::new("http://a/"), Party::new("http://a/")]);
        store.add_unseen_parties([Party::new("http://a/")]);

        assert!(store.get_next_party().is_some());
        assert!(store.get_next_party().is_none());
    }

    #[test]
    fn queue_is_fifo() {
        let store = ResendPartyStore::new();
        store.add_unseen_parties([Party::new("http://a/"), Party::new("http://b/")]);

        assert_eq!(store.get_next_party().unwrap().party.url, "http://a/");
        assert_eq!(store.get_next_party().unwrap().party.url, "http://b/");
    }

    #[test]
    fn failed_attempt_requeues_with_incremented_counter() {
        let store = ResendPartyStore::new();
        store.add_unseen_parties([Party::new("http://a/")]);

        let first = store.get_next_party().unwrap();
        assert_eq!(first.attempts, 0);
        store.increment_failed_attempt(first);

        let second = store.get_next_party().unwrap();
        assert_eq!(second.attempts, 1);
    }

    #[test]
    fn party_is_dropped_at_the_attempt_cap() {
        let store = ResendPartyStore::new();
        store.add_unseen_parties([Party::new("http://flaky/")]);

        let mut rounds = 0;
        while let Some(party) = store.get_next_party() {
            rounds += 1;
            store.increment_failed_attempt(party);
            assert!(rounds <= MAX_ATTEMPTS, "party should have been evicted");
        }
        assert_eq!(rounds, MAX_ATTEMPTS);
        assert!(store.get_next_party().is_none());
    }

    #[test]
    fn evicted_party_is_not_requalified_by_re_announcement() {
        let store = ResendPartyStore::new();
        store.add_unseen_parties([Party::new("http://flaky/")]);
        while let Some(party) = store.get_next_party() {
            store.increment_failed_attempt(party);
        }

        // seen-set membership is permanent for the process lifetime
        store.add_unseen_parties([Party::new("http://flaky/")]);
        assert!(store.get_next_party().is_none());
    }
}
