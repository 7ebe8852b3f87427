use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::trace;

use crate::store::Store;

/// Builds the refill timer.
///
/// The first tick is anchored one period after *now*, i.e. when the bucket is
/// constructed, not when the runtime first polls the refill task. `period` is
/// bounded by [`Bucket::MAX_REFILL_INTERVAL`], so the deadlines can't overflow.
///
/// [`Bucket::MAX_REFILL_INTERVAL`]: crate::Bucket::MAX_REFILL_INTERVAL
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // One token per tick, a stalled task never catches up with a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Adds one token per tick until the store is closed.
pub(crate) async fn run(store: Arc<Store>, mut ticker: Interval) {
    debug!(
        capacity = store.capacity(),
        period = ?ticker.period(),
        "refill task started"
    );

    loop {
        tokio::select! {
            biased;
            _ = store.closed() => break,
            _ = ticker.tick() => {
                if store.refill_one() {
                    trace!(available = store.available(), "token refilled");
                }
            }
        }
    }

    debug!("refill task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn adds_one_token_per_tick() {
        let store = Arc::new(Store::new(3));
        for _ in 0..3 {
            store.try_take().unwrap();
        }

        let period = Duration::from_millis(100);
        let task = tokio::spawn(run(store.clone(), ticker(period)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.available(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.available(), 2);

        store.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_store_stays_at_capacity() {
        let store = Arc::new(Store::new(2));
        let task = tokio::spawn(run(store.clone(), ticker(Duration::from_millis(10))));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.available(), 2);

        store.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_ticks_are_not_batched() {
        let store = Arc::new(Store::new(5));
        for _ in 0..5 {
            store.try_take().unwrap();
        }

        let period = Duration::from_millis(100);
        let mut ticker = ticker(period);
        // Let many periods elapse before the task ever runs.
        tokio::time::advance(period * 4 + Duration::from_millis(50)).await;
        ticker.tick().await;
        store.refill_one();

        let task = tokio::spawn(run(store.clone(), ticker));
        tokio::task::yield_now().await;
        assert_eq!(store.available(), 1);

        store.close();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_promptly_on_close() {
        let store = Arc::new(Store::new(1));
        let task = tokio::spawn(run(store.clone(), ticker(Duration::from_secs(3600))));

        store.close();
        tokio::time::timeout(Duration::from_millis(10), task)
            .await
            .expect("refill task should stop on close")
            .unwrap();
    }
}
