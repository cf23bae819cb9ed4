//! # surge-limit
//!
//! `surge-limit` is a high-throughput, in-process rate-limiting engine for
//! network services, API gateways and request middleware.
//!
//! ## Core Philosophy
//!
//! Most keyed rate limiters guard a map of buckets with a `Mutex` or sharded
//! locks, which becomes the bottleneck exactly when the limiter matters: under
//! load. `surge-limit` keeps the whole admission path lock-free. Buckets live
//! in an open-addressed table of cache-aligned entries, lookups are a short
//! probe over atomically published slots, and token consumption and refill are
//! Compare-And-Swap (CAS) loops that scale with CPU cores.
//!
//! ## Key Concepts
//!
//! * **Lock-Free**: no `Mutex` or `RwLock` anywhere on the admission path.
//! * **Lazy Refill**: tokens are replenished at the moment of the request,
//!   eliminating background worker threads and timers.
//! * **Penalty-Driven Throttling**: penalty points shrink a bucket's effective
//!   ceiling from its base down to 10% of base, using integer arithmetic only.
//! * **Best-Effort Coordination**: an optional [`DistributedStore`] lets
//!   several processes share one token budget; store failures fall open to
//!   local enforcement.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use surge_limit::{LimiterConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new();
//! limiter
//!     .create_limiter("api", LimiterConfig::new(100, Duration::from_secs(1)))
//!     .unwrap();
//!
//! if limiter.try_request("api") {
//!     // Request allowed
//! }
//! ```

use thiserror::Error;

mod clock;
mod distributed;
mod duration;
mod engine;
mod entry;
mod hash;
mod ip_filter;
mod metrics;
mod table;

pub use distributed::{CounterStore, DistributedStore, StoreError};
pub use duration::parse_duration;
pub use engine::{LimiterConfig, RateLimitInfo, RateLimiter};
pub use metrics::Stats;

/// Errors for invalid engine or limiter configuration.
///
/// These are programmer errors: nothing is mutated when one is returned.
/// Operational faults (an unreachable distributed store) never surface here;
/// the engine swallows them and enforces locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The requested bucket count is below the supported minimum of 1024.
    #[error("bucket count must be at least 1024")]
    InvalidBucketCount,

    /// Limiter keys identify the bucket and cannot be empty.
    #[error("limiter key cannot be empty")]
    EmptyKey,

    /// `max_tokens` cannot be negative.
    #[error("max_tokens cannot be negative")]
    NegativeMaxTokens,

    /// `refill_time` must be at least one millisecond.
    #[error("refill_time must be positive")]
    ZeroRefillTime,

    /// `max_penalty_points` cannot be negative.
    #[error("max_penalty_points cannot be negative")]
    NegativePenaltyPoints,
}
