use std::sync::atomic::{AtomicU64, Ordering};

/// Admission counters. Relaxed ordering throughout: these are monotonic
/// telemetry, not synchronization points, so `allowed + blocked` may briefly
/// lag `total` under concurrency.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    total: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    penalized: AtomicU64,
}

impl Metrics {
    pub(crate) fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_penalized(&self) {
        self.penalized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let total = self.total.load(Ordering::Relaxed);
        let allowed = self.allowed.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);
        let penalized = self.penalized.load(Ordering::Relaxed);

        Stats {
            total_requests: total,
            allowed_requests: allowed,
            blocked_requests: blocked,
            penalized_requests: penalized,
            allow_rate: ratio(allowed, total),
            block_rate: ratio(blocked, total),
            penalty_rate: ratio(penalized, total),
        }
    }

    /// Zero every counter. Not atomic across counters: a snapshot racing a
    /// reset can observe a mix of old and new values.
    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.allowed.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.penalized.store(0, Ordering::Relaxed);
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

/// A point-in-time view of the admission counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    pub penalized_requests: u64,
    /// `allowed / total`, or 0.0 before any request.
    pub allow_rate: f64,
    /// `blocked / total`, or 0.0 before any request.
    pub block_rate: f64,
    /// `penalized / total`, or 0.0 before any request.
    pub penalty_rate: f64,
}
