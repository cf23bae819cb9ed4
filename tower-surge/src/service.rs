use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use futures::future::{ready, Either, Ready};
use surge_limit::RateLimiter;
use tower::BoxError;
use tower::Service;

use crate::SurgeError;

/// What the engine is asked about for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitKey {
    /// Limiter key, as created on the engine with `create_limiter`.
    pub key: String,
    /// Client address for the allow/deny lists, when known.
    pub ip: Option<String>,
}

/// Keyed rate limiting middleware around an inner service.
///
/// Each request is mapped to a [`RateLimitKey`] by the extraction closure,
/// then admitted or refused by the shared engine. Refusals short-circuit
/// with [`SurgeError::RateLimited`] and never reach the inner service.
pub struct SurgeService<S, F> {
    inner: S,
    limiter: Arc<RateLimiter>,
    key_fn: F,
}

impl<S, F> SurgeService<S, F> {
    pub fn new(inner: S, limiter: Arc<RateLimiter>, key_fn: F) -> Self {
        Self {
            inner,
            limiter,
            key_fn,
        }
    }
}

impl<S, F> Clone for SurgeService<S, F>
where
    S: Clone,
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            key_fn: self.key_fn.clone(),
        }
    }
}

impl<S, F, Req> Service<Req> for SurgeService<S, F>
where
    S: Service<Req, Error = BoxError>,
    F: Fn(&Req) -> RateLimitKey,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Either<S::Future, Ready<Result<S::Response, BoxError>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Admission is per-request, so readiness is the inner service's.
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let RateLimitKey { key, ip } = (self.key_fn)(&req);

        let allowed = match ip.as_deref() {
            Some(ip) => self.limiter.try_request_from(&key, ip),
            None => self.limiter.try_request(&key),
        };

        if allowed {
            Either::Left(self.inner.call(req))
        } else {
            let retry_after = self
                .limiter
                .rate_limit_info(&key)
                .map(|info| info.retry_after)
                .unwrap_or(Duration::ZERO);
            Either::Right(ready(Err(
                SurgeError::RateLimited { retry_after }.into()
            )))
        }
    }
}
