use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::BucketConfig;
use crate::BuildError;
use crate::GetError;
use crate::TryGetError;
use crate::Violation;
use crate::refill;
use crate::store::Store;

/// A token bucket refilled by a background task.
///
/// The bucket starts full. Every `refill_interval` one token is added back, up
/// to `capacity`. Consumers wait for tokens with [`Bucket::get`] or one of its
/// cancellable variants, and [`Bucket::close`] shuts the bucket down, failing
/// every current and future acquire with [`GetError::Closed`].
///
/// Share a bucket between tasks with `Arc<Bucket>`.
///
/// Dropping the bucket without calling [`Bucket::close`] still signals the
/// refill task to stop, but nothing waits for it to finish.
#[derive(Debug)]
pub struct Bucket {
    store: Arc<Store>,
    refill_interval: Duration,
    refill: Mutex<Option<JoinHandle<()>>>,
}

impl Bucket {
    /// The longest accepted `refill_interval`, roughly 30 years.
    pub const MAX_REFILL_INTERVAL: Duration = Duration::from_secs(86400 * 365 * 30);

    /// Creates a full bucket and starts its refill task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Invalid`] listing every violated constraint, or
    /// [`BuildError::NoRuntime`] if called outside a tokio runtime.
    pub fn new(capacity: usize, refill_interval: Duration) -> Result<Self, BuildError> {
        let mut violations = Vec::new();
        if capacity == 0 {
            violations.push(Violation::ZeroCapacity);
        }
        if capacity > Semaphore::MAX_PERMITS {
            violations.push(Violation::CapacityTooLarge {
                max: Semaphore::MAX_PERMITS,
            });
        }
        if refill_interval.is_zero() {
            violations.push(Violation::ZeroInterval);
        }
        if refill_interval > Self::MAX_REFILL_INTERVAL {
            violations.push(Violation::IntervalTooLarge {
                max: Self::MAX_REFILL_INTERVAL,
            });
        }
        if !violations.is_empty() {
            return Err(BuildError::Invalid { violations });
        }

        let runtime = tokio::runtime::Handle::try_current()?;

        let store = Arc::new(Store::new(capacity));
        let ticker = refill::ticker(refill_interval);
        let handle = runtime.spawn(refill::run(store.clone(), ticker));

        debug!(capacity, ?refill_interval, "bucket created");

        Ok(Self {
            store,
            refill_interval,
            refill: Mutex::new(Some(handle)),
        })
    }

    /// Creates a bucket from a deserialized [`BucketConfig`].
    pub fn from_config(config: &BucketConfig) -> Result<Self, BuildError> {
        Self::new(config.capacity, config.refill_interval())
    }

    /// Waits for a token.
    ///
    /// To give up waiting, drop the returned future (for example by racing it
    /// in `tokio::select!`); no token is consumed unless this resolves to `Ok`.
    pub async fn get(&self) -> Result<(), GetError> {
        let res = self.store.take().await;
        trace!(?res, "get");
        res
    }

    /// Waits for a token unless `cancel` fires first.
    ///
    /// An already cancelled token wins over an available token.
    pub async fn get_with(&self, cancel: &CancellationToken) -> Result<(), GetError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GetError::Canceled),
            res = self.get() => res,
        }
    }

    /// Waits for a token until `deadline`.
    ///
    /// A deadline already in the past wins over an available token.
    pub async fn get_until(&self, deadline: Instant) -> Result<(), GetError> {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => Err(GetError::DeadlineExceeded),
            res = self.get() => res,
        }
    }

    /// Waits for a token for at most `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits without one.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<(), GetError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.get_until(deadline).await,
            None => self.get().await,
        }
    }

    /// Takes a token if one is available right now.
    pub fn try_get(&self) -> Result<(), TryGetError> {
        self.store.try_take()
    }

    /// Closes the bucket and waits for the refill task to stop.
    ///
    /// Every blocked acquire wakes with [`GetError::Closed`]. Calling this
    /// again is a no-op; concurrent callers all return after the refill task
    /// has stopped.
    pub async fn close(&self) {
        let mut refill = self.refill.lock().await;
        if self.store.close() {
            debug!("bucket closed");
        }

        if let Some(handle) = refill.take()
            && let Err(err) = handle.await
        {
            error!(%err, "refill task ended abnormally");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens available right now. Always `0` once closed.
    pub fn available(&self) -> usize {
        self.store.available()
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        if self.store.close() {
            debug!("bucket dropped without close; refill task signalled to stop");
        }
    }
}
