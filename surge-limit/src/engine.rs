use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use quanta::Clock;
use tracing::{debug, trace};

use crate::clock::MonotonicClock;
use crate::distributed::DistributedStore;
use crate::entry::Bucket;
use crate::ip_filter::IpFilter;
use crate::metrics::{Metrics, Stats};
use crate::table::BucketTable;
use crate::RateLimitError;

/// Default number of bucket slots.
const DEFAULT_BUCKETS: usize = 16_384;

/// Smallest accepted bucket count.
const MIN_BUCKET_COUNT: usize = 1024;

/// Configuration for one keyed limiter.
///
/// `new` covers the common case — a fixed window of `max_tokens` per
/// `refill_time` — and the remaining knobs are chained on:
///
/// ```rust
/// use std::time::Duration;
/// use surge_limit::LimiterConfig;
///
/// let config = LimiterConfig::new(100, Duration::from_secs(1))
///     .sliding_window()
///     .block_for(Duration::from_secs(30))
///     .max_penalty_points(10);
/// ```
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub max_tokens: i64,
    pub refill_time: Duration,
    pub sliding_window: bool,
    pub block_duration: Duration,
    pub max_penalty_points: i64,
    pub distributed_key: Option<String>,
}

impl LimiterConfig {
    /// Fixed-window budget of `max_tokens` per `refill_time`.
    pub fn new(max_tokens: i64, refill_time: Duration) -> Self {
        Self {
            max_tokens,
            refill_time,
            sliding_window: false,
            block_duration: Duration::ZERO,
            max_penalty_points: 0,
            distributed_key: None,
        }
    }

    /// Refill continuously in proportion to elapsed time instead of all at
    /// once per window.
    pub fn sliding_window(mut self) -> Self {
        self.sliding_window = true;
        self
    }

    /// Refuse every admission for `duration` after a request is rejected on
    /// an empty bucket.
    pub fn block_for(mut self, duration: Duration) -> Self {
        self.block_duration = duration;
        self
    }

    /// Enable penalty-driven throttling, with the effective ceiling reaching
    /// 10% of base when `points` have accumulated.
    pub fn max_penalty_points(mut self, points: i64) -> Self {
        self.max_penalty_points = points;
        self
    }

    /// Share this budget across processes under the given store key.
    pub fn distributed_key(mut self, key: impl Into<String>) -> Self {
        self.distributed_key = Some(key.into());
        self
    }
}

/// Snapshot of one limiter's state, shaped for HTTP rate-limit headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Current effective ceiling (after penalty reduction).
    pub limit: i64,
    /// Tokens still available; 0 while blocked.
    pub remaining: i64,
    /// Monotonic millisecond timestamp of the next window start.
    pub reset_ms: i64,
    /// Whether admissions are currently refused outright.
    pub blocked: bool,
    /// How long a blocked caller should wait, in whole seconds; zero when
    /// not blocked.
    pub retry_after: Duration,
}

/// The keyed rate-limiting engine.
///
/// One `RateLimiter` owns an open-addressed table of token buckets, the IP
/// allow/deny sets, the admission counters and (optionally) a handle to a
/// shared [`DistributedStore`]. Every operation may be called from any
/// number of threads concurrently; admission never takes a lock.
pub struct RateLimiter {
    table: BucketTable,
    filter: IpFilter,
    metrics: Metrics,
    store: Option<Arc<dyn DistributedStore>>,
    clock: MonotonicClock,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.table.capacity())
            .field("distributed", &self.store.is_some())
            .finish()
    }
}

impl RateLimiter {
    /// Engine with the default table size of 16384 buckets.
    pub fn new() -> Self {
        Self::build(DEFAULT_BUCKETS)
    }

    /// Engine with at least `bucket_count` slots (rounded up to a power of
    /// two). Counts below 1024 are rejected.
    pub fn with_capacity(bucket_count: usize) -> Result<Self, RateLimitError> {
        if bucket_count < MIN_BUCKET_COUNT {
            return Err(RateLimitError::InvalidBucketCount);
        }
        Ok(Self::build(bucket_count))
    }

    fn build(bucket_count: usize) -> Self {
        Self {
            table: BucketTable::with_capacity(bucket_count),
            filter: IpFilter::default(),
            metrics: Metrics::default(),
            store: None,
            clock: MonotonicClock::new(),
        }
    }

    /// Attach a shared token store. Buckets created with a
    /// [`LimiterConfig::distributed_key`] will coordinate through it.
    pub fn with_store(mut self, store: Arc<dyn DistributedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Drive the engine from the given `quanta` clock. Intended for tests
    /// with a mock clock; call it before creating any limiter.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = MonotonicClock::from_quanta(clock);
        self
    }

    /// Create (or replace) the limiter for `key`.
    ///
    /// Replacing an existing key resets its bucket to the new configuration
    /// with a full budget. Nothing is mutated when validation fails.
    pub fn create_limiter(&self, key: &str, config: LimiterConfig) -> Result<(), RateLimitError> {
        if key.is_empty() {
            return Err(RateLimitError::EmptyKey);
        }
        if config.max_tokens < 0 {
            return Err(RateLimitError::NegativeMaxTokens);
        }
        if config.refill_time.as_millis() == 0 {
            return Err(RateLimitError::ZeroRefillTime);
        }
        if config.max_penalty_points < 0 {
            return Err(RateLimitError::NegativePenaltyPoints);
        }

        let bucket = Bucket::new(key, &config, self.clock.now_ms());
        self.table.insert(Arc::new(bucket));
        debug!(
            key,
            max_tokens = config.max_tokens,
            sliding = config.sliding_window,
            "limiter created"
        );
        Ok(())
    }

    /// Drop the limiter for `key`, freeing its slot. Unknown keys are a
    /// no-op.
    pub fn remove_limiter(&self, key: &str) {
        if self.table.remove(key) {
            debug!(key, "limiter removed");
        }
    }

    /// Attempt one admission for `key`. Unknown keys are refused.
    pub fn try_request(&self, key: &str) -> bool {
        self.admit(key, None)
    }

    /// Attempt one admission for `key` on behalf of a client address.
    ///
    /// The deny list wins outright; an allow-listed address is admitted
    /// without touching the bucket. An empty `ip` behaves like
    /// [`try_request`](Self::try_request).
    pub fn try_request_from(&self, key: &str, ip: &str) -> bool {
        self.admit(key, if ip.is_empty() { None } else { Some(ip) })
    }

    fn admit(&self, key: &str, ip: Option<&str>) -> bool {
        self.metrics.record_total();

        if let Some(ip) = ip {
            if self.filter.is_denied(ip) {
                self.metrics.record_blocked();
                return false;
            }
            if self.filter.is_allowed(ip) {
                self.metrics.record_allowed();
                return true;
            }
        }

        let Some(bucket) = self.table.find(key) else {
            self.metrics.record_blocked();
            return false;
        };

        let now = self.clock.now_ms();
        if bucket.is_blocked(now) {
            self.metrics.record_blocked();
            return false;
        }

        bucket.refill(now, self.store.as_deref());

        // Ask the shared store first. A store error falls open to local
        // enforcement; a store refusal is final.
        let mut holding_shared_token = false;
        if let (Some(store), Some(dist_key)) = (self.store.as_deref(), bucket.distributed_key()) {
            match store.try_acquire(dist_key, bucket.current_limit()) {
                Ok(true) => holding_shared_token = true,
                Ok(false) => {
                    self.metrics.record_blocked();
                    return false;
                }
                Err(err) => {
                    debug!(key, error = %err, "distributed acquire failed; enforcing locally");
                }
            }
        }

        if !bucket.try_consume() {
            if holding_shared_token {
                self.give_back_shared_token(&bucket);
            }
            bucket.block_from(now);
            self.metrics.record_blocked();
            trace!(key, "request rejected");
            return false;
        }

        self.metrics.record_allowed();
        if bucket.penalty_points() > 0 {
            self.metrics.record_penalized();
        }
        true
    }

    /// The local bucket refused after a shared token was granted; return it.
    fn give_back_shared_token(&self, bucket: &Bucket) {
        let (Some(store), Some(dist_key)) = (self.store.as_deref(), bucket.distributed_key())
        else {
            return;
        };
        if let Err(err) = store.release(dist_key, 1) {
            debug!(key = bucket.key(), error = %err, "distributed release failed");
        }
    }

    /// Tokens currently available for `key`, or `None` for unknown keys.
    pub fn tokens(&self, key: &str) -> Option<i64> {
        self.table.find(key).map(|bucket| bucket.tokens())
    }

    /// Current effective ceiling for `key`, or `None` for unknown keys.
    pub fn current_limit(&self, key: &str) -> Option<i64> {
        self.table.find(key).map(|bucket| bucket.current_limit())
    }

    /// Refill, then report the limiter's state for HTTP header rendering.
    pub fn rate_limit_info(&self, key: &str) -> Option<RateLimitInfo> {
        let bucket = self.table.find(key)?;

        let now = self.clock.now_ms();
        bucket.refill(now, self.store.as_deref());

        let block_until = bucket.block_until();
        let blocked = block_until > now;
        let retry_after = if blocked {
            Duration::from_secs(((block_until - now) / 1000) as u64)
        } else {
            Duration::ZERO
        };

        Some(RateLimitInfo {
            limit: bucket.dynamic_limit(),
            remaining: if blocked { 0 } else { bucket.tokens().max(0) },
            reset_ms: bucket.last_refill() + bucket.refill_time_ms(),
            blocked,
            retry_after,
        })
    }

    /// Add penalty points to `key`, narrowing its effective ceiling. Unknown
    /// keys and limiters without a penalty budget are no-ops.
    pub fn add_penalty(&self, key: &str, points: i64) {
        if let Some(bucket) = self.table.find(key) {
            bucket.add_penalty(points);
            trace!(key, points, "penalty added");
        }
    }

    /// Shed penalty points from `key`, widening its effective ceiling back
    /// toward base.
    pub fn remove_penalty(&self, key: &str, points: i64) {
        if let Some(bucket) = self.table.find(key) {
            bucket.remove_penalty(points);
            trace!(key, points, "penalty removed");
        }
    }

    /// Admit every request from `ip` without consuming tokens.
    pub fn add_to_allowlist(&self, ip: &str) {
        self.filter.add_allowed(ip);
    }

    pub fn remove_from_allowlist(&self, ip: &str) {
        self.filter.remove_allowed(ip);
    }

    pub fn is_allowlisted(&self, ip: &str) -> bool {
        self.filter.is_allowed(ip)
    }

    /// Refuse every request from `ip` before any limiter is consulted.
    pub fn add_to_denylist(&self, ip: &str) {
        self.filter.add_denied(ip);
    }

    pub fn remove_from_denylist(&self, ip: &str) {
        self.filter.remove_denied(ip);
    }

    pub fn is_denylisted(&self, ip: &str) -> bool {
        self.filter.is_denied(ip)
    }

    /// Snapshot of the admission counters and ratios.
    pub fn stats(&self) -> Stats {
        self.metrics.snapshot()
    }

    /// Zero the admission counters.
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }
}
