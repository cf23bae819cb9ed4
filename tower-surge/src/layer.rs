use std::sync::Arc;

use surge_limit::RateLimiter;
use tower::Layer;

use crate::service::SurgeService;

/// Applies keyed rate limiting to requests.
///
/// The layer holds the shared engine and the key-extraction closure; every
/// service it wraps enforces against the same budgets.
pub struct SurgeLayer<F> {
    limiter: Arc<RateLimiter>,
    key_fn: F,
}

impl<F> SurgeLayer<F> {
    /// Create a layer over `limiter`, deriving a
    /// [`RateLimitKey`](crate::RateLimitKey) from each request with `key_fn`.
    pub fn new(limiter: Arc<RateLimiter>, key_fn: F) -> Self {
        Self { limiter, key_fn }
    }
}

impl<F> Clone for SurgeLayer<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            key_fn: self.key_fn.clone(),
        }
    }
}

impl<S, F> Layer<S> for SurgeLayer<F>
where
    F: Clone,
{
    type Service = SurgeService<S, F>;

    fn layer(&self, service: S) -> Self::Service {
        SurgeService::new(service, Arc::clone(&self.limiter), self.key_fn.clone())
    }
}
