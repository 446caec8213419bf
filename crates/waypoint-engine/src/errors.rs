//! Sync error model.

use waypoint_state::StateError;
use waypoint_types::cursor::CursorError;
use waypoint_types::stream::StreamIdentity;

/// Boxed error accepted from record sources and sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// SyncError: failures that abort a stream's sync attempt
// ---------------------------------------------------------------------------

/// Failure that aborts one stream's sync attempt.
///
/// None of these are recovered locally. Checkpoints already yielded before
/// the failure remain the valid resume point for the next attempt.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The upstream record source failed mid-pull.
    #[error("failed reading records for stream '{stream}': {source}")]
    RecordRead {
        stream: StreamIdentity,
        #[source]
        source: BoxError,
    },

    /// A cursor value could not be interpreted under the stream's cursor type.
    #[error("invalid cursor for stream '{stream}': {source}")]
    Cursor {
        stream: StreamIdentity,
        #[source]
        source: CursorError,
    },

    /// The state store failed to load or persist cursor state.
    #[error(transparent)]
    State(#[from] StateError),

    /// The destination rejected a record or checkpoint.
    #[error("sink failed for stream '{stream}': {source}")]
    Sink {
        stream: StreamIdentity,
        #[source]
        source: BoxError,
    },

    /// Configuration could not be loaded or validated.
    #[error("invalid sync configuration: {0:#}")]
    Config(anyhow::Error),
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        Self::Config(e)
    }
}

impl SyncError {
    /// Returns `true` if re-running the attempt from the last checkpoint
    /// may succeed (upstream, destination, or storage trouble), as opposed to
    /// a cursor or configuration problem that will recur.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RecordRead { .. } | Self::State(_) | Self::Sink { .. }
        )
    }

    /// Stream the failure belongs to, if it is stream-scoped.
    pub fn stream(&self) -> Option<&StreamIdentity> {
        match self {
            Self::RecordRead { stream, .. }
            | Self::Cursor { stream, .. }
            | Self::Sink { stream, .. } => Some(stream),
            Self::State(_) | Self::Config(_) => None,
        }
    }
}
