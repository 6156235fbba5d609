//! Store entries: one per idempotency key.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Fencing token for one Absent -> Pending transition.
///
/// Issued by the store in increasing order. A stale claimant holding an old id
/// cannot resolve a newer claim on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(u64);

impl ClaimId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim-{}", self.0)
    }
}

/// Entry state for a key.
///
/// State transitions:
/// - (absent) -> Pending            begin_or_reuse
/// - Pending -> Completed           complete
/// - Pending -> (absent)            abandon
/// - Completed(expired) -> Pending  begin_or_reuse (lazy expiry, then claim)
///
/// Absent is not stored: a key with no entry is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<P> {
    /// Claimed, operation in flight.
    Pending {
        claim: ClaimId,
        claimed_at: DateTime<Utc>,
    },

    /// Result cached. `expires_at == None` means it never expires.
    Completed {
        payload: P,
        completed_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl<P> Entry<P> {
    pub fn pending(claim: ClaimId, now: DateTime<Utc>) -> Self {
        Entry::Pending {
            claim,
            claimed_at: now,
        }
    }

    pub fn completed(payload: P, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Entry::Completed {
            payload,
            completed_at: now,
            expires_at: expiry_for(now, ttl),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Entry::Pending { .. })
    }

    /// The claim id if this entry is pending.
    pub fn claim(&self) -> Option<ClaimId> {
        match self {
            Entry::Pending { claim, .. } => Some(*claim),
            Entry::Completed { .. } => None,
        }
    }

    /// A completed entry is expired once `now` reaches its expiry instant.
    /// Pending entries never expire through ttl.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Entry::Completed {
                expires_at: Some(at),
                ..
            } => *at <= now,
            _ => false,
        }
    }

    /// A pending entry is stale once it has been held for at least `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self {
            Entry::Pending { claimed_at, .. } => match TimeDelta::from_std(timeout) {
                Ok(timeout) => now.signed_duration_since(*claimed_at) >= timeout,
                Err(_) => false,
            },
            Entry::Completed { .. } => false,
        }
    }
}

/// Absolute expiry for a ttl.
///
/// `None` and zero mean "never expires". A ttl too large to represent on the
/// calendar also never expires.
pub fn expiry_for(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
    let delta = TimeDelta::from_std(ttl).ok()?;
    now.checked_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(Duration::ZERO), None)]
    #[case(Some(Duration::from_secs(60)), Some(t0() + TimeDelta::seconds(60)))]
    #[case(Some(Duration::MAX), None)]
    fn ttl_policy(#[case] ttl: Option<Duration>, #[case] expected: Option<DateTime<Utc>>) {
        assert_eq!(expiry_for(t0(), ttl), expected);
    }

    #[test]
    fn completed_entry_expires_at_boundary() {
        let entry = Entry::completed("ok", t0(), Some(Duration::from_secs(1)));
        assert!(!entry.is_expired(t0()));
        assert!(!entry.is_expired(t0() + TimeDelta::milliseconds(999)));
        assert!(entry.is_expired(t0() + TimeDelta::seconds(1)));
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let entry = Entry::completed("ok", t0(), None);
        assert!(!entry.is_expired(t0() + TimeDelta::days(365 * 100)));
    }

    #[test]
    fn pending_entry_goes_stale_after_timeout() {
        let entry: Entry<()> = Entry::pending(ClaimId::new(1), t0());
        let timeout = Duration::from_secs(30);
        assert!(!entry.is_stale(t0() + TimeDelta::seconds(29), timeout));
        assert!(entry.is_stale(t0() + TimeDelta::seconds(30), timeout));
        assert!(!entry.is_expired(t0() + TimeDelta::days(1)));
        assert_eq!(entry.claim(), Some(ClaimId::new(1)));
    }
}
