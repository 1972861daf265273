//! Time and expiry helpers shared by the eligibility engine and the sync state machine

use chrono::{DateTime, Utc};

/// Whole days between two instants, ignoring direction
///
/// Partial days are truncated, so 23 hours apart is 0 days.
pub fn diff_in_days(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (a - b).num_days().abs()
}

/// Whether `expires_at` has been reached by `now`
pub fn is_expired_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now
}

/// Whether `expires_at` is in the past
pub fn is_now_expired(expires_at: DateTime<Utc>) -> bool {
    is_expired_at(expires_at, Utc::now())
}

/// Optional expiry: a missing timestamp never expires
pub fn is_optional_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| is_expired_at(at, now))
}
