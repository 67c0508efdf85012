use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::dedup::{Claim, DedupError, DedupStore};
use crate::fingerprint::DedupKey;

/// Process-local dedup store, for local runs and tests. Entries do not survive a restart.
///
/// With a TTL, expired entries are swept on `claim` at most once per TTL period, so the
/// map stays bounded by the number of keys claimed within roughly two TTLs. Without a
/// TTL it grows with every distinct record until `clear`.
#[derive(Clone, Default)]
pub struct MemoryDedupStore {
    inner: Arc<Mutex<Entries>>,
    ttl: Option<Duration>,
}

#[derive(Default)]
struct Entries {
    // None means the entry never expires
    keys: HashMap<DedupKey, Option<Instant>>,
    last_sweep: Option<Instant>,
}

impl Entries {
    fn is_live(&self, key: &DedupKey, now: Instant) -> bool {
        self.keys
            .get(key)
            .is_some_and(|expiry| expiry.map_or(true, |at| at > now))
    }

    fn sweep_expired(&mut self, ttl: Duration, now: Instant) {
        let due = self
            .last_sweep
            .map_or(true, |last| now.duration_since(last) >= ttl);
        if due {
            self.keys
                .retain(|_, expiry| expiry.map_or(true, |at| at > now));
            self.last_sweep = Some(now);
        }
    }
}

impl MemoryDedupStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: Default::default(),
            ttl,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.lock_entries().is_live(key, Instant::now())
    }

    /// Number of stored entries, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.lock_entries().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operator reset, drops every entry.
    pub fn clear(&self) {
        self.lock_entries().keys.clear();
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn claim(&self, key: &DedupKey) -> Result<Claim, DedupError> {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        if let Some(ttl) = self.ttl {
            entries.sweep_expired(ttl, now);
        }
        if entries.is_live(key, now) {
            return Ok(Claim::AlreadySeen);
        }

        entries
            .keys
            .insert(key.clone(), self.ttl.map(|ttl| now + ttl));
        Ok(Claim::FirstSeen)
    }

    async fn release(&self, key: &DedupKey) -> Result<(), DedupError> {
        self.lock_entries().keys.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(content: &str) -> DedupKey {
        DedupKey::from_canonical(content.as_bytes())
    }

    #[tokio::test]
    async fn second_claim_is_already_seen() {
        let store = MemoryDedupStore::default();
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::FirstSeen);
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::AlreadySeen);
        assert_eq!(store.claim(&key("b")).await.unwrap(), Claim::FirstSeen);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn release_allows_reclaiming() {
        let store = MemoryDedupStore::default();
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::FirstSeen);
        store.release(&key("a")).await.unwrap();
        assert!(!store.contains(&key("a")));
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::FirstSeen);
    }

    #[tokio::test]
    async fn expired_entries_can_be_claimed_again() {
        let store = MemoryDedupStore::new(Some(Duration::from_millis(20)));
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::FirstSeen);
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::AlreadySeen);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.claim(&key("a")).await.unwrap(), Claim::FirstSeen);
    }

    #[tokio::test]
    async fn claims_sweep_expired_entries() {
        let store = MemoryDedupStore::new(Some(Duration::from_millis(20)));
        store.claim(&key("a")).await.unwrap();
        store.claim(&key("b")).await.unwrap();
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.claim(&key("c")).await.unwrap(), Claim::FirstSeen);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&key("c")));
        assert!(!store.contains(&key("a")));
    }

    #[tokio::test]
    async fn entries_without_ttl_are_kept() {
        let store = MemoryDedupStore::default();
        store.claim(&key("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.claim(&key("b")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_claims_have_a_single_winner() {
        let store = MemoryDedupStore::default();
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            set.spawn(async move { store.claim(&key("contended")).await.unwrap() });
        }

        let mut first_seen = 0;
        while let Some(claim) = set.join_next().await {
            if claim.unwrap() == Claim::FirstSeen {
                first_seen += 1;
            }
        }
        assert_eq!(first_seen, 1);
    }

    #[tokio::test]
    async fn clear_resets_the_store() {
        let store = MemoryDedupStore::default();
        store.claim(&key("a")).await.unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
