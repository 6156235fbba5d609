//! IdempotencyGuard - 操作を idempotency key で包む
//!
//! リクエスト処理側（transport）から見た流れ:
//! 1. `begin_or_reuse` を 1 回だけ呼ぶ
//! 2. Reuse なら保存済みの結果をそのまま返す（replay）
//! 3. AlreadyPending なら実行せずにエラー（HTTP なら 409）
//! 4. Claimed なら実行し、成功で complete・失敗で abandon をちょうど 1 回
//!
//! claim は `ClaimTicket` が所有します。ticket を解決せずに drop すると
//! （タスクのキャンセル、panic など）claim は自動で abandon されます。

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::GuardConfig;
use crate::domain::{ClaimId, ClaimResult, IdempotencyKey, KeyError, StoreError};
use crate::ports::IdempotencyStore;

/// The operation a guard protects.
#[async_trait]
pub trait Operation<P>: Send + Sync {
    type Error: Send;

    async fn run(&self) -> Result<P, Self::Error>;
}

/// GuardError は guard 経由の実行エラー
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    #[error("request already pending for idempotency key {key}")]
    AlreadyPending { key: String },

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("operation failed: {0}")]
    Operation(#[source] E),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a guarded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<P> {
    /// The operation ran and its result was stored.
    Executed(P),

    /// A stored result was returned without running the operation.
    Replayed(P),

    /// No key was supplied, so the operation ran without idempotency.
    Bypassed(P),
}

impl<P> GuardOutcome<P> {
    pub fn is_replayed(&self) -> bool {
        matches!(self, GuardOutcome::Replayed(_))
    }

    pub fn payload(&self) -> &P {
        match self {
            GuardOutcome::Executed(p) | GuardOutcome::Replayed(p) | GuardOutcome::Bypassed(p) => p,
        }
    }
}

/// What the caller may do after a claim attempt.
pub enum Admission<S, K, P>
where
    S: IdempotencyStore<K, P>,
    K: Debug,
{
    /// Run the operation, then resolve the ticket.
    Execute(ClaimTicket<S, K, P>),

    /// Return this stored result.
    Replay(P),

    /// Another caller holds the key.
    AlreadyPending,
}

/// Ownership of one pending claim.
///
/// Resolve with [`ClaimTicket::complete`] or [`ClaimTicket::abandon`]. Dropping
/// an unresolved ticket abandons the claim.
pub struct ClaimTicket<S, K, P>
where
    S: IdempotencyStore<K, P>,
    K: Debug,
{
    store: Arc<S>,
    key: K,
    claim: ClaimId,
    ttl: Option<std::time::Duration>,
    resolved: bool,
    _payload: PhantomData<fn(P)>,
}

impl<S, K, P> ClaimTicket<S, K, P>
where
    S: IdempotencyStore<K, P>,
    K: Debug,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn claim_id(&self) -> ClaimId {
        self.claim
    }

    /// Store `payload` as the result for this claim.
    pub fn complete(mut self, payload: P) -> Result<(), StoreError> {
        self.resolved = true;
        self.store
            .complete_claim(&self.key, self.claim, payload, self.ttl)
    }

    /// Release the claim so a retry can run the operation again.
    pub fn abandon(mut self) {
        self.resolved = true;
        self.store.abandon_claim(&self.key, self.claim);
    }
}

impl<S, K, P> Drop for ClaimTicket<S, K, P>
where
    S: IdempotencyStore<K, P>,
    K: Debug,
{
    fn drop(&mut self) {
        if !self.resolved {
            warn!(key = ?self.key, claim = %self.claim, "claim dropped unresolved, abandoning");
            self.store.abandon_claim(&self.key, self.claim);
        }
    }
}

/// Wraps operations with claim / replay / complete / abandon.
pub struct IdempotencyGuard<S, K, P> {
    store: Arc<S>,
    config: GuardConfig,
    _marker: PhantomData<fn(K) -> P>,
}

impl<S, K, P> Clone for IdempotencyGuard<S, K, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, K, P> IdempotencyGuard<S, K, P>
where
    S: IdempotencyStore<K, P>,
    K: Clone + Debug,
    P: Clone,
{
    pub fn new(store: Arc<S>, config: GuardConfig) -> Self {
        Self {
            store,
            config,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// One atomic claim attempt.
    pub fn claim(&self, key: &K) -> Admission<S, K, P> {
        match self.store.begin_or_reuse(key) {
            ClaimResult::Claimed(claim) => Admission::Execute(ClaimTicket {
                store: Arc::clone(&self.store),
                key: key.clone(),
                claim,
                ttl: self.config.ttl,
                resolved: false,
                _payload: PhantomData,
            }),
            ClaimResult::Reuse(payload) => Admission::Replay(payload),
            ClaimResult::AlreadyPending => Admission::AlreadyPending,
        }
    }

    /// Run `f` at most once per key.
    ///
    /// # Errors
    /// - [`GuardError::AlreadyPending`] if another caller holds the key
    /// - [`GuardError::Operation`] if `f` fails (the claim is abandoned)
    /// - [`GuardError::Store`] if the claim was taken over before completion
    pub async fn execute_with<F, Fut, E>(
        &self,
        key: &K,
        f: F,
    ) -> Result<GuardOutcome<P>, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<P, E>>,
    {
        let ticket = match self.claim(key) {
            Admission::Execute(ticket) => ticket,
            Admission::Replay(payload) => {
                debug!(?key, "returning stored response");
                return Ok(GuardOutcome::Replayed(payload));
            }
            Admission::AlreadyPending => {
                warn!(?key, "request already in progress");
                return Err(GuardError::AlreadyPending {
                    key: format!("{key:?}"),
                });
            }
        };

        match f().await {
            Ok(payload) => {
                ticket.complete(payload.clone())?;
                debug!(?key, "stored response");
                Ok(GuardOutcome::Executed(payload))
            }
            Err(err) => {
                ticket.abandon();
                debug!(?key, "operation failed, claim abandoned");
                Err(GuardError::Operation(err))
            }
        }
    }

    /// Run an [`Operation`] at most once per key.
    pub async fn execute<O>(&self, key: &K, op: &O) -> Result<GuardOutcome<P>, GuardError<O::Error>>
    where
        O: Operation<P> + ?Sized,
    {
        self.execute_with(key, || op.run()).await
    }
}

impl<S, P> IdempotencyGuard<S, IdempotencyKey, P>
where
    S: IdempotencyStore<IdempotencyKey, P>,
    P: Clone,
{
    /// Entry point for a raw header value.
    ///
    /// A missing or blank key runs the operation without idempotency. With
    /// `enforce_uuid4` set, a key that is not a v4 UUID is rejected before the
    /// store is touched.
    pub async fn execute_raw<F, Fut, E>(
        &self,
        raw: Option<&str>,
        f: F,
    ) -> Result<GuardOutcome<P>, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<P, E>>,
    {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            debug!("no idempotency key, running directly");
            return f().await.map(GuardOutcome::Bypassed).map_err(GuardError::Operation);
        };

        let key = if self.config.enforce_uuid4 {
            IdempotencyKey::parse_uuid4(raw).inspect_err(|err| {
                warn!(error = %err, "rejecting malformed idempotency key");
            })?
        } else {
            IdempotencyKey::new(raw)
        };
        self.execute_with(&key, f).await
    }
}
