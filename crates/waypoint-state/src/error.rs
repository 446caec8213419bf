//! State store error types.

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by [`StateStore`](crate::StateStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying storage failure.
    #[error("state backend error: {0}")]
    Backend(#[source] BoxError),

    /// Underlying storage failure, tagged with the operation that hit it.
    #[error("state backend error in {context}: {source}")]
    BackendContext {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored cursor value could not be encoded or decoded.
    #[error("cursor serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Wrap a storage driver error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }

    /// Wrap a storage driver error with the name of the failing operation.
    pub fn backend_context(
        context: &'static str,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BackendContext {
            context,
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
