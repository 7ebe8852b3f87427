use std::sync::Arc;
use std::time::Duration;

use tbucket::Bucket;
use tower::Layer;

use crate::service::TokenBucketService;

/// Applies token bucket admission to requests.
#[derive(Debug, Clone)]
pub struct TokenBucketLayer {
    bucket: Arc<Bucket>,
    fail_fast: bool,
    timeout: Option<Duration>,
}

impl TokenBucketLayer {
    /// Create a TokenBucketLayer
    pub fn new(bucket: Arc<Bucket>) -> Self {
        TokenBucketLayer {
            bucket,
            fail_fast: false,
            timeout: None,
        }
    }

    /// Set whether the service should fail immediately when the bucket is empty.
    ///
    /// If `true`, the service will return `BucketRejection::Exhausted` immediately
    /// instead of waiting for the next refill.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set a unified timeout for both waiting for a token and request execution.
    ///
    /// If the total time exceeds this duration, the service
    /// will return `BucketRejection::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<S> Layer<S> for TokenBucketLayer {
    type Service = TokenBucketService<S>;

    fn layer(&self, service: S) -> Self::Service {
        let mut svc =
            TokenBucketService::new(service, self.bucket.clone()).with_fail_fast(self.fail_fast);
        if let Some(timeout) = self.timeout {
            svc = svc.with_timeout(timeout);
        }
        svc
    }
}
