use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Meter;
use pin_project_lite::pin_project;
use tokio::time::Instant;
use tokio::time::Sleep;
use tokio::time::sleep;
use tokio_util::sync::ReusableBoxFuture;
use tower::BoxError;
use tower::Service;
use tracing::trace;

use tbucket::Bucket;
use tbucket::GetError;
use tbucket::TryGetError;

use crate::error::BucketRejection;

// Sync regardless of the wrapped future, as BoxCloneSyncService requires.
type AcquireFuture = ReusableBoxFuture<'static, Result<(), GetError>>;

#[derive(Clone, Debug)]
struct TokenBucketServiceMetrics {
    waits: Counter<u64>,
    rejections: Counter<u64>,
}

impl TokenBucketServiceMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            waits: meter.u64_counter("token_waits").build(),
            rejections: meter.u64_counter("bucket_rejections").build(),
        }
    }
}

fn record_rejection(rejections: &Counter<u64>, rejection: &BucketRejection) {
    trace!(%rejection, "request rejected");
    rejections.add(1, &[KeyValue::new("reason", rejection.reason())]);
}

/// Takes one token from a [`Bucket`] per request before calling the inner service.
///
/// A token is taken in `poll_ready` and spent by the following `call`. Dropping
/// a ready service without calling it forfeits that token.
pub struct TokenBucketService<S> {
    inner: S,
    bucket: Arc<Bucket>,
    acquire: Option<AcquireFuture>,
    permit_acquired: bool,
    fail_fast: bool,
    timeout: Option<Duration>,
    wait_start: Option<Instant>,
    instruments: TokenBucketServiceMetrics,
}

impl<S: std::fmt::Debug> std::fmt::Debug for TokenBucketService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketService")
            .field("inner", &self.inner)
            .field("bucket", &self.bucket)
            .field("waiting", &self.acquire.is_some())
            .field("permit_acquired", &self.permit_acquired)
            .field("fail_fast", &self.fail_fast)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pin_project! {
    /// A future that bounds the inner service future by what is left of the timeout.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        #[pin]
        deadline: Option<Sleep>,
        rejections: Counter<u64>,
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<BoxError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(res) = this.inner.poll(cx) {
            return Poll::Ready(res);
        }
        if let Some(deadline) = this.deadline.as_pin_mut()
            && deadline.poll(cx).is_ready()
        {
            let rejection = BucketRejection::Timeout;
            record_rejection(this.rejections, &rejection);
            let err: BoxError = Box::new(rejection);
            return Poll::Ready(Err(E::from(err)));
        }
        Poll::Pending
    }
}

// Manually implement Clone because the pending acquire future cannot be cloned
impl<S> Clone for TokenBucketService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            bucket: Arc::clone(&self.bucket),
            // We start with a fresh wait state for the new clone
            acquire: None,
            permit_acquired: false,
            fail_fast: self.fail_fast,
            timeout: self.timeout,
            wait_start: None,
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> Service<Req> for TokenBucketService<S>
where
    S: Service<Req, Error = BoxError>,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Check inner service readiness FIRST to avoid taking tokens we can't spend
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        if self.permit_acquired {
            return Poll::Ready(Ok(()));
        }

        if self.fail_fast {
            return match self.bucket.try_get() {
                Ok(()) => {
                    self.permit_acquired = true;
                    Poll::Ready(Ok(()))
                }
                Err(TryGetError::Empty) => self.reject(BucketRejection::Exhausted {
                    retry_after: self.bucket.refill_interval(),
                }),
                Err(TryGetError::Closed) => self.reject(BucketRejection::Closed),
            };
        }

        let fresh = self.acquire.is_none();
        let acquire = self.acquire.get_or_insert_with(|| {
            let start = *self.wait_start.get_or_insert_with(Instant::now);
            let bucket = Arc::clone(&self.bucket);
            // A timeout too large to add to `start` never expires.
            match self.timeout.and_then(|timeout| start.checked_add(timeout)) {
                Some(deadline) => {
                    ReusableBoxFuture::new(async move { bucket.get_until(deadline).await })
                }
                None => ReusableBoxFuture::new(async move { bucket.get().await }),
            }
        });

        match acquire.poll(cx) {
            Poll::Pending => {
                // One wait per acquire, however often it is polled
                if fresh {
                    self.instruments.waits.add(1, &[]);
                }
                Poll::Pending
            }
            Poll::Ready(res) => {
                self.acquire = None;
                match res {
                    Ok(()) => {
                        self.permit_acquired = true;
                        Poll::Ready(Ok(()))
                    }
                    Err(GetError::Closed) => {
                        self.wait_start = None;
                        self.reject(BucketRejection::Closed)
                    }
                    Err(GetError::DeadlineExceeded | GetError::Canceled) => {
                        self.wait_start = None;
                        self.reject(BucketRejection::Timeout)
                    }
                }
            }
        }
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.permit_acquired = false;
        let start = self.wait_start.take();
        let deadline = self.timeout.map(|timeout| {
            let remaining = match start {
                Some(start) => timeout.saturating_sub(start.elapsed()),
                None => timeout,
            };
            sleep(remaining)
        });

        ResponseFuture {
            inner: self.inner.call(req),
            deadline,
            rejections: self.instruments.rejections.clone(),
        }
    }
}

impl<S> TokenBucketService<S> {
    pub fn new(inner: S, bucket: Arc<Bucket>) -> Self {
        let instruments = TokenBucketServiceMetrics::new(&global::meter("token_bucket_service"));

        Self {
            inner,
            bucket,
            acquire: None,
            permit_acquired: false,
            fail_fast: false,
            timeout: None,
            wait_start: None,
            instruments,
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record metrics through `meter` instead of the global meter.
    pub fn with_meter(mut self, meter: &Meter) -> Self {
        self.instruments = TokenBucketServiceMetrics::new(meter);
        self
    }

    fn reject(&self, rejection: BucketRejection) -> Poll<Result<(), BoxError>> {
        record_rejection(&self.instruments.rejections, &rejection);
        Poll::Ready(Err(Box::new(rejection)))
    }
}
