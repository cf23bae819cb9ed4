//! # Tower Surge
//!
//! `tower-surge` exposes the [`surge-limit`](surge_limit) engine as
//! [Tower](https://github.com/tower-rs/tower) middleware: keyed, per-client
//! rate limiting for any `Service`.
//!
//! Unlike single-bucket rate limiting layers, the decision here depends on
//! the request: a key-extraction closure maps each request to a limiter key
//! (and optionally a client address), and the shared [`RateLimiter`] engine
//! decides. Denied requests fail fast with [`SurgeError::RateLimited`]
//! carrying a retry hint — queuing and load-shedding stacks compose on the
//! outside with the usual Tower layers.
//!
//! ## Feature Flags
//! - `axum`: implements `axum::response::IntoResponse` for [`SurgeError`],
//!   rendering `429 Too Many Requests` with a `Retry-After` header.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use surge_limit::{LimiterConfig, RateLimiter};
//! use tower_surge::{RateLimitKey, SurgeLayer};
//!
//! let limiter = Arc::new(RateLimiter::new());
//! limiter
//!     .create_limiter("per-ip", LimiterConfig::new(100, Duration::from_secs(1)))
//!     .unwrap();
//!
//! let layer = SurgeLayer::new(limiter, |request: &String| RateLimitKey {
//!     key: "per-ip".to_owned(),
//!     ip: Some(request.clone()),
//! });
//! # let _ = layer;
//! ```

pub use surge_limit::RateLimiter;

mod error;
mod layer;
mod service;


pub use error::SurgeError;
pub use layer::SurgeLayer;
pub use service::{RateLimitKey, SurgeService};
