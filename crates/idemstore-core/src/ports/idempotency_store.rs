//! IdempotencyStore port - key のライフサイクル管理
//!
//! absent -> pending -> completed -> (expired = absent) の遷移を管理します。
//!
//! # 実装
//! - **InMemoryIdempotencyStore**: 単一プロセス用（`impls::inmem_store`）

use std::time::Duration;

use crate::domain::{ClaimId, ClaimResult, StoreError};
use crate::observability::StoreCounts;

/// IdempotencyStore は key ごとの entry を保持する
///
/// # 設計原則
/// - すべての操作は同期・非ブロッキング（I/O なし、待ち合わせなし）
/// - `begin_or_reuse` が唯一の claim 手段（check と claim を分けない）
/// - 期限切れ判定は読み取り時（lazy）。`purge_expired` はメモリ回収のみ
/// - 操作はすべて単一 key で完結する
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッド・複数タスクから同時に呼ばれる）
pub trait IdempotencyStore<K, P>: Send + Sync {
    /// Atomically reuse a cached result, report an in-flight claim, or claim the key.
    ///
    /// An expired completed entry is removed and the key is claimed afresh.
    fn begin_or_reuse(&self, key: &K) -> ClaimResult<P>;

    /// Store the result for a pending key.
    ///
    /// `ttl` of `None` or zero means the result never expires.
    ///
    /// # Errors
    /// [`StoreError::NotPending`] if the key is absent or already completed.
    fn complete(&self, key: &K, payload: P, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Drop a pending claim. No-op if the key is absent or completed.
    fn abandon(&self, key: &K);

    /// Whether the key is currently pending. Diagnostics only: never gate a
    /// claim on this, use [`IdempotencyStore::begin_or_reuse`].
    fn is_pending(&self, key: &K) -> bool;

    /// Like [`IdempotencyStore::complete`], but only if the pending entry still
    /// belongs to `claim`.
    fn complete_claim(
        &self,
        key: &K,
        claim: ClaimId,
        payload: P,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Like [`IdempotencyStore::abandon`], but only if the pending entry still
    /// belongs to `claim`.
    fn abandon_claim(&self, key: &K, claim: ClaimId);

    /// Remove expired completed entries. Pending entries are never touched.
    /// Returns the number of removed entries.
    fn purge_expired(&self) -> usize;

    /// Snapshot of entry counts.
    fn counts(&self) -> StoreCounts;
}
