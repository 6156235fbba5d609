//! GcLoop - 期限切れ結果のバックグラウンド回収
//!
//! 期限切れ判定の正本は読み取り時の lazy チェック（`begin_or_reuse`）です。
//! このループはメモリ回収のためだけに、期限切れの completed entry を定期的に削除します。
//! Pending entry は削除しません。
//!
//! # フロー
//! 1. `interval` ごとに tick（取りこぼした tick はスキップ）
//! 2. `IdempotencyStore::purge_expired()` で期限切れを削除
//! 3. `GcHandle::shutdown()` で停止

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ports::IdempotencyStore;

/// `interval` の下限。`tokio::time::interval` は 0 を受け付けない
pub const MIN_GC_INTERVAL: Duration = Duration::from_millis(1);

/// GcLoop は期限切れの結果を削除
pub struct GcLoop<S, K, P> {
    store: Arc<S>,
    interval: Duration,
    _marker: PhantomData<fn() -> (K, P)>,
}

/// Handle to a running [`GcLoop`].
pub struct GcHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl GcHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        match self.join.await {
            Ok(()) => {}
            Err(err) if err.is_panic() => error!(error = %err, "gc loop task panicked"),
            Err(err) => warn!(error = %err, "gc loop task ended abnormally"),
        }
    }

    /// True once the loop task has exited (shutdown or panic).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<S, K, P> GcLoop<S, K, P>
where
    S: IdempotencyStore<K, P> + 'static,
    K: 'static,
    P: 'static,
{
    /// A zero `interval` is clamped to [`MIN_GC_INTERVAL`].
    pub fn new(store: Arc<S>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                min_ms = MIN_GC_INTERVAL.as_millis() as u64,
                "gc interval of zero clamped to minimum"
            );
            MIN_GC_INTERVAL
        } else {
            interval
        };
        Self {
            store,
            interval,
            _marker: PhantomData,
        }
    }

    /// One purge pass. Returns the number of removed entries.
    pub fn run_once(&self) -> usize {
        let purged = self.store.purge_expired();
        if purged > 0 {
            debug!(purged, "purged expired idempotency entries");
        }
        purged
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self) -> GcHandle {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run(cancel.clone()));
        GcHandle { cancel, join }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.interval.as_millis() as u64, "gc loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("gc loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::domain::ClaimResult;
    use crate::impls::InMemoryIdempotencyStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    type TestStore = InMemoryIdempotencyStore<String, u32, Arc<FixedClock>>;

    fn setup() -> (Arc<TestStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryIdempotencyStore::with_clock(
            StoreConfig::default(),
            clock.clone(),
        ));
        (store, clock)
    }

    fn seed(store: &TestStore) {
        store.begin_or_reuse(&"expiring".to_string());
        store
            .complete(&"expiring".to_string(), 1, Some(Duration::from_secs(5)))
            .unwrap();
        store.begin_or_reuse(&"kept".to_string());
        store.complete(&"kept".to_string(), 2, None).unwrap();
        store.begin_or_reuse(&"pending".to_string());
    }

    #[test]
    fn run_once_purges_only_expired() {
        let (store, clock) = setup();
        seed(&store);
        let gc = GcLoop::<_, String, u32>::new(store.clone(), Duration::from_secs(1));

        assert_eq!(gc.run_once(), 0);
        clock.advance(Duration::from_secs(6));
        assert_eq!(gc.run_once(), 1);

        assert_eq!(store.len(), 2);
        assert!(store.is_pending(&"pending".to_string()));
        assert_eq!(
            store.begin_or_reuse(&"kept".to_string()),
            ClaimResult::Reuse(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_purges_and_shuts_down() {
        let (store, clock) = setup();
        seed(&store);
        clock.advance(Duration::from_secs(6));

        let handle = GcLoop::<_, String, u32>::new(store.clone(), Duration::from_secs(10)).spawn();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(store.len(), 2);
        assert!(store.is_pending(&"pending".to_string()));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped_and_loop_keeps_running() {
        let (store, clock) = setup();
        seed(&store);
        clock.advance(Duration::from_secs(6));

        let handle = GcLoop::<_, String, u32>::new(store.clone(), Duration::ZERO).spawn();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(!handle.is_finished());
        assert_eq!(store.len(), 2);

        handle.shutdown().await;
    }

    #[test]
    fn zero_interval_uses_minimum() {
        let (store, _clock) = setup();
        let gc = GcLoop::<_, String, u32>::new(store, Duration::ZERO);
        assert_eq!(gc.interval, MIN_GC_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_never_changes_what_readers_see() {
        let (store, clock) = setup();
        seed(&store);
        clock.advance(Duration::from_secs(6));

        // Before any sweep the lazy check already treats the entry as absent.
        assert!(store.begin_or_reuse(&"expiring".to_string()).is_claimed());

        let handle = GcLoop::<_, String, u32>::new(store.clone(), Duration::from_secs(1)).spawn();
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.shutdown().await;

        // The fresh claim survived the sweeps.
        assert!(store.is_pending(&"expiring".to_string()));
        assert_eq!(
            store.begin_or_reuse(&"expiring".to_string()),
            ClaimResult::AlreadyPending
        );
    }
}
