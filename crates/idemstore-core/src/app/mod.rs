//! App - ports を組み合わせたアプリケーション層
//!
//! # 主要コンポーネント
//! - **IdempotencyGuard**: 操作を claim → 実行 → complete / abandon で包む
//! - **GcLoop**: 期限切れ結果のバックグラウンド回収

pub mod gc_loop;
pub mod guard;

pub use self::gc_loop::{GcHandle, GcLoop, MIN_GC_INTERVAL};
pub use self::guard::{Admission, ClaimTicket, GuardError, GuardOutcome, IdempotencyGuard, Operation};
