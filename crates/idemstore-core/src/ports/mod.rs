//! Ports - 抽象化レイヤー
//!
//! ストアと時刻源を trait として切り出し、実装の詳細を隠蔽します。
//! 本番の単一プロセス構成では InMemory 実装を、テストでは FixedClock を差し込みます。

pub mod clock;
pub mod idempotency_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::idempotency_store::IdempotencyStore;
