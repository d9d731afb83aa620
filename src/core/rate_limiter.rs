//! Rate limiter (C7, spec §4.6).
//!
//! Each key gets a ring of 60 one-second buckets tracking request count and
//! token sum, bounding memory regardless of request volume. Buckets rotate
//! lazily on access rather than via a background sweep for the per-request
//! check; a periodic sweep (piggy-backed on the health-check interval,
//! wired from `main.rs`) reclaims entries that are entirely stale so memory
//! doesn't grow with the all-time set of keys.

use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const WINDOW_SECONDS: usize = 60;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    second: i64,
    requests: u32,
    tokens: u64,
}

struct KeyWindow {
    buckets: [Bucket; WINDOW_SECONDS],
    last_touched_unix: i64,
}

impl KeyWindow {
    fn new() -> Self {
        Self {
            buckets: [Bucket::default(); WINDOW_SECONDS],
            last_touched_unix: now_unix(),
        }
    }

    fn sum(&self, now: i64) -> (u32, u64) {
        let mut requests = 0u32;
        let mut tokens = 0u64;
        for b in &self.buckets {
            if now - b.second < WINDOW_SECONDS as i64 {
                requests += b.requests;
                tokens += b.tokens;
            }
        }
        (requests, tokens)
    }

    fn record(&mut self, now: i64, tokens: u64) {
        let slot = (now.rem_euclid(WINDOW_SECONDS as i64)) as usize;
        let bucket = &mut self.buckets[slot];
        if bucket.second != now {
            *bucket = Bucket {
                second: now,
                requests: 0,
                tokens: 0,
            };
        }
        bucket.requests += 1;
        bucket.tokens += tokens;
        self.last_touched_unix = now;
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Decision returned by [`RateLimiter::check`] (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_ms: u64,
}

/// Per-key RPM/TPM sliding-window limiter (C7).
pub struct RateLimiter {
    windows: DashMap<String, KeyWindow>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Check `rpm`/`tpm` limits for `key_id` and record this request's token
    /// cost (`estimated_input_tokens + max_tokens`, spec §4.6) if admitted.
    /// Rejected requests are not recorded, so a client hammering the gateway
    /// while over budget doesn't push its own window further out.
    pub fn check(&self, key_id: &str, rpm: u32, tpm: u32, tokens: u64) -> RateLimitDecision {
        let now = now_unix();
        let mut window = self
            .windows
            .entry(key_id.to_string())
            .or_insert_with(KeyWindow::new);

        let (requests, used_tokens) = window.sum(now);
        if requests >= rpm || used_tokens + tokens > tpm as u64 {
            return RateLimitDecision {
                allowed: false,
                retry_after_ms: 1_000,
            };
        }

        window.record(now, tokens);
        RateLimitDecision {
            allowed: true,
            retry_after_ms: 0,
        }
    }

    /// Reclaim entries whose entire window has expired. Safe to call from a
    /// background sweep on any cadence; under-calling only delays memory
    /// reclamation, never correctness.
    pub fn sweep_expired(&self) {
        let now = now_unix();
        self.windows
            .retain(|_, w| now - w.last_touched_unix < WINDOW_SECONDS as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("k1", 10, 10_000, 100).allowed);
        }
    }

    #[test]
    fn rejects_once_rpm_exceeded() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("k1", 3, 100_000, 1).allowed);
        }
        let decision = limiter.check("k1", 3, 100_000, 1);
        assert!(!decision.allowed);
        assert!(decision.retry_after_ms > 0);
    }

    #[test]
    fn rejects_once_tpm_exceeded() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("k1", 100, 150, 100).allowed);
        let decision = limiter.check("k1", 100, 150, 100);
        assert!(!decision.allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.check("k1", 3, 100_000, 1);
        }
        assert!(!limiter.check("k1", 3, 100_000, 1).allowed);
        assert!(limiter.check("k2", 3, 100_000, 1).allowed);
    }

    #[test]
    fn sweep_removes_stale_entries_only() {
        let limiter = RateLimiter::new();
        limiter.check("k1", 10, 10_000, 1);
        limiter.sweep_expired();
        assert!(limiter.windows.contains_key("k1"));
    }
}
