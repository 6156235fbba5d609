//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryIdempotencyStore**: 単一プロセス用のストア
//!
//! プロセス間で共有するストア（Redis など）はこのクレートの対象外です。

pub mod inmem_store;

pub use self::inmem_store::InMemoryIdempotencyStore;
