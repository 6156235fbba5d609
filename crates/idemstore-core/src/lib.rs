//! idemstore-core
//!
//! Idempotency cache: claim a key, run the operation once, replay the stored
//! result for retries until it expires.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（key, entry, claim result, stored response, errors）
//! - **ports**: 抽象化レイヤー（IdempotencyStore, Clock）
//! - **impls**: 実装（InMemoryIdempotencyStore）
//! - **app**: アプリケーションロジック（IdempotencyGuard, GcLoop）
//! - **config**: StoreConfig / GuardConfig
//! - **observability**: StoreCounts

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{GuardError, GuardOutcome, IdempotencyGuard};
pub use config::{GuardConfig, StoreConfig};
pub use domain::{ClaimResult, IdempotencyKey, StoreError, StoredResponse};
pub use impls::InMemoryIdempotencyStore;
pub use ports::IdempotencyStore;
