//! Claim results returned by `begin_or_reuse`.

use super::entry::ClaimId;

/// Outcome of a single atomic begin-or-reuse step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult<P> {
    /// The caller now owns the key and must complete or abandon it exactly once.
    Claimed(ClaimId),

    /// Another caller holds the key. Nothing was changed.
    AlreadyPending,

    /// A completed, unexpired result exists. Nothing was changed.
    Reuse(P),
}

impl<P> ClaimResult<P> {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimResult::Claimed(_))
    }

    pub fn is_already_pending(&self) -> bool {
        matches!(self, ClaimResult::AlreadyPending)
    }

    /// The cached payload, if this is a reuse.
    pub fn into_reuse(self) -> Option<P> {
        match self {
            ClaimResult::Reuse(payload) => Some(payload),
            _ => None,
        }
    }
}
