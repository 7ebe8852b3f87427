//! # Tower TBucket
//!
//! `tower-tbucket` gates a [Tower](https://github.com/tower-rs/tower) service on
//! tokens from a [`tbucket::Bucket`].
//!
//! ## Layers
//!
//! - [`TokenBucketLayer`]: `poll_ready` waits for a token (optionally bounded by a
//!   unified timeout) or, in fail-fast mode, rejects immediately when the bucket
//!   is empty.
//! - [`ManagedTokenBucketLayer`]: a pre-composed, non-queuing stack:
//!
//! 1. **Fail Fast**: an empty bucket rejects with `BucketRejection::Exhausted`.
//! 2. **Load Shedding**: an inner service that is not ready rejects with
//!    `BucketRejection::Overloaded`.
//! 3. **Timeouts**: the inner service is bounded by `max_wait`, failing with
//!    `BucketRejection::Timeout`.
//! 4. **Error Mapping**: internal Tower errors are converted into the cloneable
//!    [`BucketRejection`] domain.
//!
//! Closing the bucket turns every later request into `BucketRejection::Closed`,
//! including requests already waiting in `poll_ready`.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`BucketRejection`], allowing automatic
//!   conversion to HTTP status codes (408, 429, 503, 500).

mod error;
mod layer;
mod managed_layer;
mod service;


pub use error::BucketRejection;
pub use layer::TokenBucketLayer;
pub use managed_layer::ManagedTokenBucketLayer;
pub use service::ResponseFuture;
pub use service::TokenBucketService;
