/// Errors produced by the Surge middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurgeError {
    /// The request was refused by the rate limiting engine.
    ///
    /// `retry_after` is non-zero only when the limiter is in a block window;
    /// an empty bucket without a block duration reports `Duration::ZERO`.
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests` with a `Retry-After` header.
    #[error("rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// How long the client should wait before retrying.
        retry_after: std::time::Duration,
    },
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for SurgeError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{header, HeaderValue, StatusCode};
        use axum::response::IntoResponse;

        let message = self.to_string();
        let SurgeError::RateLimited { retry_after } = self;

        let mut response = (StatusCode::TOO_MANY_REQUESTS, message).into_response();
        let secs = retry_after.as_secs().max(1);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        response
    }
}
