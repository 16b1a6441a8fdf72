//! In-process per-key token-bucket rate limiter.
//!
//! One bucket per API key, lazily created and lazily refilled. Bucket
//! mutation is serialized per key with a `parking_lot::Mutex`; the map
//! itself (`DashMap`) is safe for concurrent insert/evict/read. An hourly
//! sweeper evicts buckets idle for more than 24h so the map doesn't grow
//! unbounded across the lifetime of the process.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

const DEFAULT_EVICTION_IDLE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of a `TokenBucketLimiter::check` call. Mirrors the
/// `X-RateLimit-*` headers the gateway must set on both the allow and deny
/// paths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    /// floor(tokens) remaining after this request, if allowed; floor(tokens)
    /// at decision time otherwise.
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Only meaningful when `allowed` is false.
    pub retry_after: Duration,
}

struct Bucket {
    /// Current token balance.
    tokens: Mutex<f64>,
    /// Monotonic microseconds of the bucket's creation instant, used to
    /// convert `Instant`-based refills into a value we can store in an
    /// atomic without needing an unstable `Instant` representation.
    last_refill_us: AtomicU64,
    last_seen_us: AtomicU64,
}

fn micros_since(epoch: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(epoch).as_micros() as u64
}

/// Process-wide map of per-key token buckets.
pub struct TokenBucketLimiter {
    buckets: DashMap<Uuid, Bucket>,
    epoch: Instant,
    eviction_idle: Duration,
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            epoch: Instant::now(),
            eviction_idle: DEFAULT_EVICTION_IDLE,
        }
    }

    #[cfg(test)]
    pub fn with_eviction_idle(eviction_idle: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            epoch: Instant::now(),
            eviction_idle,
        }
    }

    /// Admit (or reject) one request against `key`'s bucket, whose capacity
    /// and refill rate are both `max_rps` tokens/second.
    ///
    /// `max_rps == 0` is treated as "unlimited" so a misconfigured App
    /// (spec requires `maxRps >= 0`) cannot deadlock every request at zero
    /// tokens forever.
    pub fn check(&self, key: Uuid, max_rps: u32) -> RateLimitDecision {
        let now = Instant::now();
        let now_us = micros_since(self.epoch, now);

        if max_rps == 0 {
            return RateLimitDecision {
                allowed: true,
                limit: 0,
                remaining: 0,
                reset_at: Utc::now(),
                retry_after: Duration::ZERO,
            };
        }

        let capacity = max_rps as f64;

        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Bucket {
                tokens: Mutex::new(capacity),
                last_refill_us: AtomicU64::new(now_us),
                last_seen_us: AtomicU64::new(now_us),
            });
        bucket.last_seen_us.store(now_us, Ordering::Relaxed);

        let mut tokens = bucket.tokens.lock();

        let last_refill_us = bucket.last_refill_us.swap(now_us, Ordering::AcqRel);
        let elapsed_secs = now_us.saturating_sub(last_refill_us) as f64 / 1_000_000.0;
        *tokens = (*tokens + elapsed_secs * capacity).min(capacity);

        let allowed = *tokens >= 1.0;
        if allowed {
            *tokens -= 1.0;
        }

        let remaining = tokens.floor().max(0.0);
        let seconds_to_full = ((capacity - *tokens) / capacity).max(0.0);
        let reset_at = Utc::now() + chrono::Duration::milliseconds((seconds_to_full * 1000.0) as i64);
        let retry_after = if allowed {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(((1.0 - *tokens) / capacity).max(0.0).ceil())
        };

        trace!(%key, tokens = *tokens, allowed, "token bucket decision");

        RateLimitDecision {
            allowed,
            limit: max_rps,
            remaining: remaining as u32,
            reset_at,
            retry_after,
        }
    }

    /// Remove buckets that haven't been touched in `self.eviction_idle`.
    /// Called by the sweeper, but safe (and useful in tests) to call
    /// directly.
    pub fn sweep(&self) {
        let now_us = micros_since(self.epoch, Instant::now());
        let idle_us = self.eviction_idle.as_micros() as u64;

        self.buckets.retain(|_, bucket| {
            let last_seen = bucket.last_seen_us.load(Ordering::Relaxed);
            now_us.saturating_sub(last_seen) <= idle_us
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Handle to the background sweeper task. Dropping it does not stop the
/// sweeper; call `stop` explicitly so tests (and graceful shutdown) are
/// deterministic.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Start a background task that calls `limiter.sweep()` every `interval`
/// (default: hourly, per spec).
pub fn start_sweeper(limiter: Arc<TokenBucketLimiter>, interval: Option<Duration>) -> SweeperHandle {
    let interval = interval.unwrap_or(DEFAULT_SWEEP_INTERVAL);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let before = limiter.len();
            limiter.sweep();
            let after = limiter.len();
            if before != after {
                debug!(evicted = before - after, remaining = after, "swept idle rate-limit buckets");
            }
        }
    });

    SweeperHandle { task }
}
