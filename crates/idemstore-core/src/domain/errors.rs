//! Errors - ストア操作のエラー
//!
//! begin_or_reuse / abandon / is_pending はエラーを返さない（全状態で total）。
//! エラーになるのは complete のプロトコル違反だけ。

use thiserror::Error;

/// StoreError はストア操作のエラー
///
/// # 分類
/// - NotPending: complete が Pending でない key に対して呼ばれた
///   （二重 complete / abandon 後の complete / claim していない key）
///
/// エラーは該当 key に閉じており、他の key の状態には影響しない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("key {key} is not pending")]
    NotPending { key: String },
}

impl StoreError {
    pub(crate) fn not_pending<K: std::fmt::Debug>(key: &K) -> Self {
        StoreError::NotPending {
            key: format!("{key:?}"),
        }
    }
}
