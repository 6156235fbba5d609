//! InMemoryIdempotencyStore - 単一プロセス用のストア
//!
//! # 実装詳細
//! - HashMap<K, Entry<P>> をプロセス内で 1 つの Mutex で保護
//! - 各操作は O(1) かつ非ブロッキングなので、map 全体のロックで十分
//! - read-then-write（begin_or_reuse / complete）は 1 つのクリティカルセクション内で完結
//!
//! # 使用例
//! ```ignore
//! let store = InMemoryIdempotencyStore::new(StoreConfig::default());
//! match store.begin_or_reuse(&key) {
//!     ClaimResult::Claimed(_) => { /* 実行して complete / abandon */ }
//!     ClaimResult::AlreadyPending => { /* 409 */ }
//!     ClaimResult::Reuse(payload) => { /* replay */ }
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::domain::{ClaimId, ClaimResult, Entry, StoreError};
use crate::observability::StoreCounts;
use crate::ports::{Clock, IdempotencyStore, SystemClock};

/// Map + claim id counter. Only ever touched under the lock.
struct StoreState<K, P> {
    entries: HashMap<K, Entry<P>>,

    /// Next claim id to hand out.
    next_claim_id: u64,
}

impl<K: Eq + Hash + Clone + Debug, P: Clone> StoreState<K, P> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_claim_id: 1,
        }
    }

    fn allocate_claim_id(&mut self) -> ClaimId {
        let id = ClaimId::new(self.next_claim_id);
        self.next_claim_id += 1;
        id
    }

    fn claim(&mut self, key: &K, now: DateTime<Utc>) -> ClaimResult<P> {
        let claim = self.allocate_claim_id();
        self.entries.insert(key.clone(), Entry::pending(claim, now));
        debug!(?key, %claim, "idempotency key claimed");
        ClaimResult::Claimed(claim)
    }

    fn begin_or_reuse(
        &mut self,
        key: &K,
        now: DateTime<Utc>,
        pending_timeout: Option<Duration>,
    ) -> ClaimResult<P> {
        let Some(entry) = self.entries.get(key) else {
            return self.claim(key, now);
        };

        match entry {
            Entry::Completed { .. } if entry.is_expired(now) => {
                debug!(?key, "expired result removed, claiming afresh");
                self.claim(key, now)
            }
            Entry::Completed { payload, .. } => {
                debug!(?key, "reusing stored result");
                ClaimResult::Reuse(payload.clone())
            }
            Entry::Pending { claim, claimed_at } => {
                if let Some(timeout) = pending_timeout
                    && entry.is_stale(now, timeout)
                {
                    warn!(
                        ?key,
                        stale_claim = %claim,
                        claimed_at = %claimed_at,
                        timeout_secs = timeout.as_secs(),
                        "pending claim timed out, taking over"
                    );
                    return self.claim(key, now);
                }
                ClaimResult::AlreadyPending
            }
        }
    }

    /// Pending -> Completed. `claim == None` accepts any pending claim.
    fn complete(
        &mut self,
        key: &K,
        claim: Option<ClaimId>,
        payload: P,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let Some(entry) = self.entries.get_mut(key) else {
            warn!(?key, "complete on a key that is not pending");
            return Err(StoreError::not_pending(key));
        };

        let current = entry.claim();
        let matches = match (current, claim) {
            (Some(current), Some(expected)) => current == expected,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            warn!(?key, ?current, expected = ?claim, "complete on a key that is not pending");
            return Err(StoreError::not_pending(key));
        }

        *entry = Entry::completed(payload, now, ttl);
        debug!(?key, ttl_secs = ttl.map(|t| t.as_secs()), "stored result");
        Ok(())
    }

    /// Pending -> absent. `claim == None` accepts any pending claim.
    fn abandon(&mut self, key: &K, claim: Option<ClaimId>) {
        let Some(current) = self.entries.get(key).and_then(Entry::claim) else {
            return;
        };
        if claim.is_some_and(|expected| expected != current) {
            return;
        }
        self.entries.remove(key);
        debug!(?key, claim = %current, "pending claim abandoned");
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn counts(&self, now: DateTime<Utc>) -> StoreCounts {
        let mut counts = StoreCounts::default();
        for entry in self.entries.values() {
            match entry {
                Entry::Pending { .. } => counts.pending += 1,
                Entry::Completed { .. } if entry.is_expired(now) => counts.expired += 1,
                Entry::Completed { .. } => counts.completed += 1,
            }
        }
        counts
    }
}

/// In-memory idempotency store.
///
/// Cloning shares the same underlying map.
pub struct InMemoryIdempotencyStore<K, P, C = SystemClock> {
    state: Arc<Mutex<StoreState<K, P>>>,
    clock: C,
    config: StoreConfig,
}

impl<K, P> InMemoryIdempotencyStore<K, P, SystemClock>
where
    K: Eq + Hash + Clone + Debug,
    P: Clone,
{
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, P, C> InMemoryIdempotencyStore<K, P, C>
where
    K: Eq + Hash + Clone + Debug,
    P: Clone,
    C: Clock,
{
    pub fn with_clock(config: StoreConfig, clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new())),
            clock,
            config,
        }
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Drop every entry. Intended for resetting between tests.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }
}

impl<K, P, C> Clone for InMemoryIdempotencyStore<K, P, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<K, P, C> IdempotencyStore<K, P> for InMemoryIdempotencyStore<K, P, C>
where
    K: Eq + Hash + Clone + Debug + Send,
    P: Clone + Send,
    C: Clock,
{
    fn begin_or_reuse(&self, key: &K) -> ClaimResult<P> {
        let now = self.clock.now();
        self.state
            .lock()
            .begin_or_reuse(key, now, self.config.pending_timeout)
    }

    fn complete(&self, key: &K, payload: P, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.state.lock().complete(key, None, payload, now, ttl)
    }

    fn abandon(&self, key: &K) {
        self.state.lock().abandon(key, None);
    }

    fn is_pending(&self, key: &K) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(Entry::is_pending)
    }

    fn complete_claim(
        &self,
        key: &K,
        claim: ClaimId,
        payload: P,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.state.lock().complete(key, Some(claim), payload, now, ttl)
    }

    fn abandon_claim(&self, key: &K, claim: ClaimId) {
        self.state.lock().abandon(key, Some(claim));
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().purge_expired(now)
    }

    fn counts(&self) -> StoreCounts {
        let now = self.clock.now();
        self.state.lock().counts(now)
    }
}
