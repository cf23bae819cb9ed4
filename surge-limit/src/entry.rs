use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::distributed::DistributedStore;
use crate::engine::LimiterConfig;

/// Hot bucket state, mutated on every admission.
///
/// Aligned to its own cache line so CAS traffic on one bucket does not
/// false-share with the configuration fields or with neighbouring slots.
#[repr(align(64))]
#[derive(Debug)]
struct HotState {
    tokens: AtomicI64,
    last_refill: AtomicI64,
    block_until: AtomicI64,
    dynamic_max_tokens: AtomicI64,
    penalty_points: AtomicI64,
}

/// One named rate budget: a token bucket plus its immutable configuration.
///
/// Validity lives in the table slot, not the bucket: publishing an
/// `Arc<Bucket>` through a slot is what makes the configuration visible to
/// readers, so a reader that finds the bucket also sees every field below.
#[derive(Debug)]
pub(crate) struct Bucket {
    hot: HotState,
    key: String,
    base_max_tokens: i64,
    refill_time_ms: i64,
    block_duration_ms: i64,
    max_penalty_points: i64,
    sliding_window: bool,
    distributed_key: Option<String>,
}

impl Bucket {
    pub(crate) fn new(key: &str, config: &LimiterConfig, now: i64) -> Self {
        Self {
            hot: HotState {
                tokens: AtomicI64::new(config.max_tokens),
                last_refill: AtomicI64::new(now),
                block_until: AtomicI64::new(0),
                dynamic_max_tokens: AtomicI64::new(config.max_tokens),
                penalty_points: AtomicI64::new(0),
            },
            key: key.to_owned(),
            base_max_tokens: config.max_tokens,
            refill_time_ms: config.refill_time.as_millis() as i64,
            block_duration_ms: config.block_duration.as_millis() as i64,
            max_penalty_points: config.max_penalty_points,
            sliding_window: config.sliding_window,
            distributed_key: config.distributed_key.clone(),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn distributed_key(&self) -> Option<&str> {
        self.distributed_key.as_deref()
    }

    pub(crate) fn refill_time_ms(&self) -> i64 {
        self.refill_time_ms
    }

    pub(crate) fn tokens(&self) -> i64 {
        self.hot.tokens.load(Ordering::Acquire)
    }

    pub(crate) fn current_limit(&self) -> i64 {
        self.hot.dynamic_max_tokens.load(Ordering::Acquire)
    }

    pub(crate) fn last_refill(&self) -> i64 {
        self.hot.last_refill.load(Ordering::Acquire)
    }

    pub(crate) fn block_until(&self) -> i64 {
        self.hot.block_until.load(Ordering::Acquire)
    }

    pub(crate) fn penalty_points(&self) -> i64 {
        self.hot.penalty_points.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn base_max_tokens(&self) -> i64 {
        self.base_max_tokens
    }

    /// Effective token ceiling under the current penalty, as a pure function
    /// of `penalty_points`. Each point removes `base / max_points` tokens;
    /// the reduction is capped at 90% and the result never drops below
    /// `max(ceil(base / 10), 1)`.
    pub(crate) fn dynamic_limit(&self) -> i64 {
        if self.max_penalty_points <= 0 {
            return self.base_max_tokens;
        }
        let points = self.hot.penalty_points.load(Ordering::Acquire);
        if points <= 0 {
            return self.base_max_tokens;
        }
        let points = points.min(self.max_penalty_points);

        let reduction = ((points * self.base_max_tokens) / self.max_penalty_points)
            .min((self.base_max_tokens * 9) / 10);
        let floor = ((self.base_max_tokens + 9) / 10).max(1);
        (self.base_max_tokens - reduction).max(floor)
    }

    /// Replenish tokens if the refill policy says enough time has passed.
    ///
    /// The CAS on `last_refill` is the linearization point for a refill
    /// event: the winner publishes `dynamic_max_tokens` and `tokens` with
    /// release ordering, and any thread that later acquires `last_refill`
    /// observes them. Losers retry from a fresh read.
    pub(crate) fn refill(&self, now: i64, store: Option<&dyn DistributedStore>) {
        loop {
            let last = self.hot.last_refill.load(Ordering::Acquire);
            let elapsed = now - last;

            if self.sliding_window {
                if elapsed <= 0 {
                    return;
                }
            } else if elapsed < self.refill_time_ms {
                return;
            }

            let limit = self.dynamic_limit();
            let (new_tokens, added) = if self.sliding_window {
                // Integer division: elapsed time short of a whole token
                // adds nothing, but the refill clock still advances.
                let added = (limit * elapsed) / self.refill_time_ms;
                let current = self.hot.tokens.load(Ordering::Acquire);
                ((current + added).min(limit), added)
            } else {
                (limit, 0)
            };

            if self
                .hot
                .last_refill
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.hot.dynamic_max_tokens.store(limit, Ordering::Release);
                self.hot.tokens.store(new_tokens, Ordering::Release);
                self.sync_store_after_refill(store, limit, added);
                return;
            }
        }
    }

    /// Mirror a completed refill into the shared store, best-effort.
    fn sync_store_after_refill(
        &self,
        store: Option<&dyn DistributedStore>,
        limit: i64,
        added: i64,
    ) {
        let (Some(store), Some(dist_key)) = (store, self.distributed_key.as_deref()) else {
            return;
        };
        let result = if self.sliding_window {
            if added == 0 {
                return;
            }
            store.release(dist_key, added)
        } else {
            store.reset(dist_key, limit)
        };
        if let Err(err) = result {
            debug!(key = %self.key, error = %err, "distributed refill sync failed");
        }
    }

    /// Whether admissions are currently refused outright. An expired block
    /// is cleared on first observation past its deadline.
    pub(crate) fn is_blocked(&self, now: i64) -> bool {
        let until = self.hot.block_until.load(Ordering::Acquire);
        if until == 0 {
            return false;
        }
        if now >= until {
            self.hot.block_until.store(0, Ordering::Release);
            return false;
        }
        true
    }

    /// Start a block window, if this bucket is configured with one.
    pub(crate) fn block_from(&self, now: i64) {
        if self.block_duration_ms > 0 {
            self.hot
                .block_until
                .store(now + self.block_duration_ms, Ordering::Release);
        }
    }

    /// Take one token. Fails without side effects when the bucket is empty.
    pub(crate) fn try_consume(&self) -> bool {
        let mut current = self.hot.tokens.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return false;
            }
            match self.hot.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Accumulate penalty points and republish the effective ceiling.
    /// No-op when the bucket was created without a penalty budget.
    pub(crate) fn add_penalty(&self, points: i64) {
        if self.max_penalty_points <= 0 {
            return;
        }
        self.hot.penalty_points.fetch_add(points, Ordering::AcqRel);
        self.hot
            .dynamic_max_tokens
            .store(self.dynamic_limit(), Ordering::Release);
    }

    /// Shed penalty points without going below zero, then republish the
    /// effective ceiling.
    pub(crate) fn remove_penalty(&self, points: i64) {
        if self.max_penalty_points <= 0 {
            return;
        }
        let mut current = self.hot.penalty_points.load(Ordering::Acquire);
        while current > 0 {
            let target = (current - points).max(0);
            match self.hot.penalty_points.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.hot
                        .dynamic_max_tokens
                        .store(self.dynamic_limit(), Ordering::Release);
                    break;
                }
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bucket(config: LimiterConfig) -> Bucket {
        Bucket::new("test", &config, 0)
    }

    #[test]
    fn dynamic_limit_scales_linearly() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(60)).max_penalty_points(10));

        assert_eq!(b.dynamic_limit(), 100);
        b.add_penalty(5);
        assert_eq!(b.dynamic_limit(), 50);
        b.add_penalty(3);
        assert_eq!(b.dynamic_limit(), 20);
    }

    #[test]
    fn dynamic_limit_floors_at_tenth_of_base() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(60)).max_penalty_points(10));

        b.add_penalty(10);
        assert_eq!(b.dynamic_limit(), 10);

        // Over-penalized points clamp on read rather than on write.
        b.add_penalty(1_000);
        assert_eq!(b.dynamic_limit(), 10);
        assert!(b.penalty_points() > 10);
    }

    #[test]
    fn dynamic_limit_never_reaches_zero() {
        let b = bucket(LimiterConfig::new(5, Duration::from_secs(60)).max_penalty_points(10));
        b.add_penalty(10);
        assert_eq!(b.dynamic_limit(), 1);
    }

    #[test]
    fn penalties_ignored_without_budget() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(60)));
        b.add_penalty(5);
        assert_eq!(b.penalty_points(), 0);
        assert_eq!(b.dynamic_limit(), 100);
        assert_eq!(b.current_limit(), 100);
    }

    #[test]
    fn remove_penalty_saturates_at_zero() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(60)).max_penalty_points(10));

        b.add_penalty(4);
        b.remove_penalty(100);
        assert_eq!(b.penalty_points(), 0);
        assert_eq!(b.current_limit(), 100);

        b.remove_penalty(1);
        assert_eq!(b.penalty_points(), 0);
    }

    #[test]
    fn penalty_republishes_current_limit() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(60)).max_penalty_points(10));
        b.add_penalty(5);
        assert_eq!(b.current_limit(), 50);
        b.remove_penalty(5);
        assert_eq!(b.current_limit(), 100);
    }

    #[test]
    fn fixed_window_refill_waits_out_the_window() {
        let b = bucket(LimiterConfig::new(5, Duration::from_millis(100)));
        for _ in 0..5 {
            assert!(b.try_consume());
        }
        assert!(!b.try_consume());

        // Mid-window refills are no-ops, and repeating one changes nothing.
        b.refill(50, None);
        assert_eq!(b.tokens(), 0);
        assert_eq!(b.last_refill(), 0);
        b.refill(50, None);
        assert_eq!(b.tokens(), 0);
        assert_eq!(b.last_refill(), 0);

        b.refill(100, None);
        assert_eq!(b.tokens(), 5);
        assert_eq!(b.last_refill(), 100);
    }

    #[test]
    fn sliding_refill_adds_proportionally() {
        let b = bucket(LimiterConfig::new(100, Duration::from_secs(1)).sliding_window());
        for _ in 0..100 {
            assert!(b.try_consume());
        }

        b.refill(250, None);
        assert_eq!(b.tokens(), 25);
        assert_eq!(b.last_refill(), 250);

        // Clamped at the ceiling no matter how long the idle gap.
        b.refill(60_000, None);
        assert_eq!(b.tokens(), 100);
    }

    #[test]
    fn sliding_refill_advances_clock_even_without_tokens() {
        let b = bucket(LimiterConfig::new(10, Duration::from_secs(1)).sliding_window());
        for _ in 0..10 {
            assert!(b.try_consume());
        }

        // 10 tokens per second means 99ms rounds down to nothing, but the
        // attempt still counts as a refill event and restarts the window.
        b.refill(99, None);
        assert_eq!(b.tokens(), 0);
        assert_eq!(b.last_refill(), 99);

        // A full 100ms since the last event is worth one token.
        b.refill(199, None);
        assert_eq!(b.tokens(), 1);
        assert_eq!(b.last_refill(), 199);
    }

    #[test]
    fn refill_caps_tokens_at_penalized_limit() {
        let b = bucket(
            LimiterConfig::new(100, Duration::from_millis(100)).max_penalty_points(10),
        );
        b.add_penalty(5);
        b.refill(100, None);
        assert_eq!(b.tokens(), 50);
        assert_eq!(b.current_limit(), 50);
    }

    #[test]
    fn block_clears_lazily_after_expiry() {
        let b = bucket(
            LimiterConfig::new(1, Duration::from_secs(10)).block_for(Duration::from_millis(500)),
        );

        assert!(!b.is_blocked(10));
        b.block_from(10);
        assert!(b.is_blocked(11));
        assert!(b.is_blocked(509));
        assert!(!b.is_blocked(510));
        // Cleared by the observation above.
        assert_eq!(b.block_until(), 0);
    }

    #[test]
    fn block_is_noop_without_duration() {
        let b = bucket(LimiterConfig::new(1, Duration::from_secs(10)));
        b.block_from(10);
        assert!(!b.is_blocked(11));
    }

    #[test]
    fn consume_stops_at_zero() {
        let b = bucket(LimiterConfig::new(2, Duration::from_secs(10)));
        assert!(b.try_consume());
        assert!(b.try_consume());
        assert!(!b.try_consume());
        assert_eq!(b.tokens(), 0);
    }

    #[test]
    fn zero_capacity_bucket_never_admits() {
        let b = bucket(LimiterConfig::new(0, Duration::from_millis(10)));
        assert!(!b.try_consume());
        b.refill(100, None);
        assert!(!b.try_consume());
    }
}
