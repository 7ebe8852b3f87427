use tokio::sync::Semaphore;
use tokio::sync::TryAcquireError;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::GetError;
use crate::TryGetError;

/// Token storage shared between a [`Bucket`](crate::Bucket) and its refill task.
///
/// Tokens are semaphore permits. A consumer takes a permit and forgets it, the
/// refill task is the only producer. The closed flag is kept separately and is
/// checked on both sides of every permit acquisition.
#[derive(Debug)]
pub(crate) struct Store {
    capacity: usize,
    tokens: Semaphore,
    closed: CancellationToken,
}

impl Store {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tokens: Semaphore::new(capacity),
            closed: CancellationToken::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn available(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.tokens.available_permits().min(self.capacity)
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the store has been closed.
    pub(crate) async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Waits for a token. Cancel safe: dropping the future never loses a token.
    pub(crate) async fn take(&self) -> Result<(), GetError> {
        if self.is_closed() {
            return Err(GetError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(GetError::Closed),
            permit = self.tokens.acquire() => {
                let permit = permit.map_err(|_| GetError::Closed)?;
                // Forget even on the closed path so a late permit can never
                // be handed back above capacity.
                permit.forget();
                if self.is_closed() {
                    return Err(GetError::Closed);
                }
                trace!(available = self.tokens.available_permits(), "token taken");
                Ok(())
            }
        }
    }

    pub(crate) fn try_take(&self) -> Result<(), TryGetError> {
        if self.is_closed() {
            return Err(TryGetError::Closed);
        }

        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                if self.is_closed() {
                    Err(TryGetError::Closed)
                } else {
                    Ok(())
                }
            }
            Err(TryAcquireError::NoPermits) => Err(TryGetError::Empty),
            Err(TryAcquireError::Closed) => Err(TryGetError::Closed),
        }
    }

    /// Adds a single token unless the store is full or closed.
    ///
    /// Returns whether a token was added. Only the refill task calls this, and
    /// consumers can only lower the count between the check and the add.
    pub(crate) fn refill_one(&self) -> bool {
        if self.is_closed() || self.tokens.available_permits() >= self.capacity {
            return false;
        }
        self.tokens.add_permits(1);
        true
    }

    /// One-way transition to closed. Wakes every waiter in [`Store::take`].
    ///
    /// Returns `true` only for the call that performed the transition.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.is_cancelled();
        self.closed.cancel();
        self.tokens.close();
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let store = Store::new(3);
        assert_eq!(store.available(), 3);
        assert!(!store.is_closed());
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let store = Store::new(2);
        assert!(!store.refill_one());
        assert_eq!(store.available(), 2);

        store.try_take().unwrap();
        assert!(store.refill_one());
        assert!(!store.refill_one());
        assert_eq!(store.available(), 2);
    }

    #[test]
    fn try_take_drains_then_reports_empty() {
        let store = Store::new(2);
        assert_eq!(store.try_take(), Ok(()));
        assert_eq!(store.try_take(), Ok(()));
        assert_eq!(store.try_take(), Err(TryGetError::Empty));
        assert_eq!(store.available(), 0);
    }

    #[test]
    fn closed_store_rejects_and_reports_empty() {
        let store = Store::new(2);
        assert!(store.close());
        assert!(!store.close());
        assert_eq!(store.available(), 0);
        assert_eq!(store.try_take(), Err(TryGetError::Closed));
        assert!(!store.refill_one());
    }

    #[tokio::test]
    async fn take_wakes_on_close() {
        let store = std::sync::Arc::new(Store::new(1));
        store.take().await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.take().await })
        };
        tokio::task::yield_now().await;
        store.close();

        assert_eq!(waiter.await.unwrap(), Err(GetError::Closed));
    }
}
