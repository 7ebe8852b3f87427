use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tbucket::Bucket;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::BucketRejection;
use crate::TokenBucketService;

/// A non-queuing token bucket stack.
///
/// Requests never wait for a refill. An empty bucket rejects straight away,
/// which keeps rejections out of the tail latency.
///
/// ### Error Responsibilities:
/// - **Exhausted (`BucketRejection::Exhausted`)**: the bucket had no token.
/// - **Closed (`BucketRejection::Closed`)**: the bucket has been shut down.
/// - **LoadShedding (`BucketRejection::Overloaded`)**: the inner service was not ready.
/// - **Timeout (`BucketRejection::Timeout`)**: the inner service took longer than `max_wait`.
pub struct ManagedTokenBucketLayer<Req> {
    bucket: Arc<Bucket>,
    max_wait: Duration,
    _phantom: PhantomData<fn(Req)>,
}

// Note: Deriving Clone causes issues when using the layer with Axum.
impl<Req> Clone for ManagedTokenBucketLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            max_wait: self.max_wait,
            _phantom: PhantomData,
        }
    }
}

impl<S, Req> Layer<S> for ManagedTokenBucketLayer<Req>
where
    S: Service<Req, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    Req: Send + 'static,
{
    type Service = BoxCloneSyncService<Req, S::Response, BoxError>;

    fn layer(&self, inner: S) -> Self::Service {
        let tb = TokenBucketService::new(inner, self.bucket.clone()).with_fail_fast(true);

        // Timeout is outer to ensure a hard deadline on the entire process.
        let svc = tower::ServiceBuilder::new()
            .timeout(self.max_wait)
            .load_shed()
            .service(tb);

        let mapped_svc = tower::util::MapErr::new(svc, |err: BoxError| {
            if err.is::<tower::timeout::error::Elapsed>() {
                BoxError::from(BucketRejection::Timeout)
            } else if err.is::<tower::load_shed::error::Overloaded>() {
                BoxError::from(BucketRejection::Overloaded)
            } else if err.is::<BucketRejection>() {
                err
            } else {
                Box::from(BucketRejection::Inner(err.to_string()))
            }
        });

        BoxCloneSyncService::new(mapped_svc)
    }
}

impl<Req> ManagedTokenBucketLayer<Req> {
    pub fn new(bucket: Arc<Bucket>, max_wait: Duration) -> Self {
        Self {
            bucket,
            max_wait,
            _phantom: PhantomData,
        }
    }
}
