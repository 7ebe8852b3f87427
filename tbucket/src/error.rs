use std::fmt;
use std::time::Duration;

/// A single constraint violated by the parameters given to [`Bucket::new`].
///
/// [`Bucket::new`]: crate::Bucket::new
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("capacity must be greater than 0")]
    ZeroCapacity,

    #[error("capacity must not exceed {max}")]
    CapacityTooLarge { max: usize },

    #[error("refill interval must be greater than 0")]
    ZeroInterval,

    #[error("refill interval must not exceed {max:?}")]
    IntervalTooLarge { max: Duration },
}

/// Errors produced while constructing a [`Bucket`](crate::Bucket).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// One or more parameters were invalid.
    ///
    /// Every check runs, so this lists all of the violations at once.
    #[error("invalid bucket parameters: {}", Violations(.violations))]
    Invalid { violations: Vec<Violation> },

    /// The refill task needs a tokio runtime and none was running.
    #[error("a tokio runtime is required to drive the refill task")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl BuildError {
    /// The violated constraints, empty unless this is [`BuildError::Invalid`].
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations } => violations,
            Self::NoRuntime(_) => &[],
        }
    }
}

struct Violations<'a>(&'a [Violation]);

impl fmt::Display for Violations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Errors returned by the blocking acquire methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetError {
    /// The bucket was closed before or while waiting for a token.
    ///
    /// This is terminal: every later acquire on the same bucket fails the same way.
    #[error("bucket is closed")]
    Closed,

    /// The caller's cancellation token fired first.
    #[error("acquire canceled")]
    Canceled,

    /// The caller's deadline passed first.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by [`Bucket::try_get`](crate::Bucket::try_get).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryGetError {
    #[error("no tokens available")]
    Empty,

    #[error("bucket is closed")]
    Closed,
}
