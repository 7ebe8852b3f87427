//! # tbucket
//!
//! `tbucket` is a token bucket driven by a background refill task.
//!
//! ## Core Philosophy
//!
//! Where a lazy limiter recomputes its state on every request, a [`Bucket`] owns
//! a timer: every `refill_interval` one token is put back, up to `capacity`.
//! Consumers *wait* for tokens instead of being told to retry later, and the
//! wait can be cancelled per caller or ended for everyone by closing the bucket.
//!
//! ## Key Concepts
//!
//! * **Starts Full**: a fresh bucket hands out `capacity` tokens without waiting.
//! * **One Token Per Tick**: missed ticks are skipped, never batched.
//! * **Cancellable Acquire**: [`Bucket::get_with`] and [`Bucket::get_until`]
//!   give up without consuming a token.
//! * **Explicit Close**: [`Bucket::close`] wakes every waiter with
//!   [`GetError::Closed`] and waits for the refill task to stop. It is idempotent.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tbucket::Bucket;
//! use tbucket::GetError;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bucket = Bucket::new(100, Duration::from_millis(10))?;
//!
//! bucket.get().await?;
//! // Request allowed
//!
//! bucket.close().await;
//! assert_eq!(bucket.get().await, Err(GetError::Closed));
//! # Ok(())
//! # }
//! ```

mod bucket;
mod config;
mod error;
mod refill;
mod store;

pub use bucket::Bucket;
pub use config::BucketConfig;
pub use error::BuildError;
pub use error::GetError;
pub use error::TryGetError;
pub use error::Violation;
