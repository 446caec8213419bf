//! State store trait definition.
//!
//! [`StateStore`] defines the storage contract for per-stream watermarks
//! and run history. Model types live in [`waypoint_types::state`].

use waypoint_types::checkpoint::CheckpointSnapshot;
use waypoint_types::cursor::CursorPosition;
use waypoint_types::state::{CursorState, PipelineId, RunStats, RunStatus};
use waypoint_types::stream::StreamIdentity;

use crate::error;

/// Storage contract for sync state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateStore>`:
/// each stream of a sync calls into the same store from its own worker, and
/// every call is an independent operation with no cross-stream transaction.
pub trait StateStore: Send + Sync {
    /// Read the last durable cursor for a (pipeline, stream) pair.
    ///
    /// Returns `Ok(None)` when no checkpoint has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load_cursor(
        &self,
        pipeline: &PipelineId,
        stream: &StreamIdentity,
    ) -> error::Result<Option<CursorState>>;

    /// Durably record `position` as the stream's resume point and return the
    /// resulting checkpoint.
    ///
    /// Persistence and snapshot construction are one call, so a checkpoint
    /// is never observed half-written.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn persist_and_snapshot(
        &self,
        pipeline: &PipelineId,
        stream: &StreamIdentity,
        position: &CursorPosition,
        records_since_last_checkpoint: u64,
    ) -> error::Result<CheckpointSnapshot>;

    /// Begin a new sync run, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, pipeline: &PipelineId, stream: &StreamIdentity) -> error::Result<i64>;

    /// Finalize a sync run with status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;
}
