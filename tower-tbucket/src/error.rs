/// Errors produced by the token bucket middleware stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketRejection {
    /// The bucket has been closed; no request will be admitted again.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("Token bucket is closed")]
    Closed,

    /// Fail-fast mode found the bucket empty.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header derived from the refill interval.
    #[error("No tokens available; retry after {retry_after:?}")]
    Exhausted {
        /// One refill interval, the earliest a token can reappear.
        retry_after: std::time::Duration,
    },

    /// The request waited for a token, or ran, longer than allowed.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out waiting for a token")]
    Timeout,

    /// The inner service was not ready and the request was shed.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("Service is overloaded; request shed")]
    Overloaded,

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

impl BucketRejection {
    /// Label used for the `reason` attribute of the rejection counter.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Exhausted { .. } => "exhausted",
            Self::Timeout => "timeout",
            Self::Overloaded => "overloaded",
            Self::Inner(_) => "inner",
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for BucketRejection {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::Closed | Self::Overloaded => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None)
            }
            Self::Timeout => (StatusCode::REQUEST_TIMEOUT, self.to_string(), None),
            Self::Exhausted { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    self.to_string(),
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
            Self::Inner(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None),
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
