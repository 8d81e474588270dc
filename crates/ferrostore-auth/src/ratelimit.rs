//! Per-source-IP token-bucket rate limiting for login and signing endpoints.
//!
//! Two independent limiters are expected to be constructed by callers: one
//! tuned tight for console login attempts, one looser for signed S3 requests.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::error::AuthError;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A table of independent token buckets, one per source IP, sharing a quota.
pub struct IpRateLimiter {
    quota: Quota,
    buckets: DashMap<IpAddr, Arc<Limiter>>,
}

impl IpRateLimiter {
    /// `burst` is the bucket capacity; `per_second` is the steady refill rate.
    #[must_use]
    pub fn new(burst: u32, per_second: u32) -> Self {
        let per_second = NonZeroU32::new(per_second.max(1)).unwrap();
        let burst = NonZeroU32::new(burst.max(1)).unwrap();
        Self {
            quota: Quota::per_second(per_second).allow_burst(burst),
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, ip: IpAddr) -> Result<(), AuthError> {
        let limiter = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();
        limiter.check().map_err(|_| AuthError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_within_burst() {
        let limiter = IpRateLimiter::new(3, 1);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..3 {
            assert!(limiter.check(ip).is_ok());
        }
    }

    #[test]
    fn test_rejects_beyond_burst() {
        let limiter = IpRateLimiter::new(1, 1);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).is_ok());
        assert!(matches!(limiter.check(ip), Err(AuthError::RateLimited)));
    }

    #[test]
    fn test_tracks_ips_independently() {
        let limiter = IpRateLimiter::new(1, 1);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(b).is_ok());
    }
}
