//! Exponential backoff with full jitter for replication retries (§4.10).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Computes the next retry time for a work item that has failed `attempts`
/// times so far, given the rule's configured base and cap (seconds).
///
/// Doubles the base delay per attempt up to `cap_secs`, then picks uniformly
/// at random in `[0, delay]` ("full jitter") so a burst of failures doesn't
/// retry in lockstep.
#[must_use]
pub fn next_retry_at(attempts: i32, base_secs: u64, cap_secs: u64) -> DateTime<Utc> {
    let delay_secs = base_secs.saturating_mul(1u64 << attempts.clamp(0, 32)).min(cap_secs.max(1));
    let jittered = rand::thread_rng().gen_range(0..=delay_secs);
    Utc::now() + Duration::seconds(jittered as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_never_exceeds_cap() {
        let now = Utc::now();
        for attempt in 0..20 {
            let retry_at = next_retry_at(attempt, 1, 300);
            assert!(retry_at <= now + Duration::seconds(301));
        }
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        // base=1s: attempt 0 caps at 1s, attempt 10 caps at 300s (cap reached).
        let bound_early = next_retry_at(0, 1, 300) - Utc::now();
        let bound_late = next_retry_at(10, 1, 300) - Utc::now();
        assert!(bound_early <= Duration::seconds(2));
        assert!(bound_late <= Duration::seconds(301));
    }
}
