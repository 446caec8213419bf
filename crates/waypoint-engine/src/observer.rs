//! Injectable checkpoint observability.

use waypoint_types::checkpoint::CheckpointSnapshot;
use waypoint_types::state::PipelineId;
use waypoint_types::stream::StreamIdentity;

use crate::watermark::OutOfOrderCursor;

/// Receives checkpoint lifecycle events from a [`CheckpointingSequence`].
///
/// Shared across the streams of one sync, so implementations must be
/// thread-safe. Every method defaults to a no-op.
///
/// [`CheckpointingSequence`]: crate::sequence::CheckpointingSequence
pub trait CheckpointObserver: Send + Sync {
    /// A checkpoint was persisted and is about to be yielded.
    fn on_checkpoint(&self, _pipeline: &PipelineId, _snapshot: &CheckpointSnapshot) {}

    /// A record's cursor compared below the watermark. Called exactly once
    /// per offending record.
    fn on_out_of_order_cursor(
        &self,
        _pipeline: &PipelineId,
        _stream: &StreamIdentity,
        _violation: &OutOfOrderCursor,
    ) {
    }
}

/// Default observer: emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CheckpointObserver for TracingObserver {
    fn on_checkpoint(&self, pipeline: &PipelineId, snapshot: &CheckpointSnapshot) {
        tracing::info!(
            pipeline = pipeline.as_str(),
            stream = %snapshot.stream,
            checkpoint_id = snapshot.id,
            cursor_value = snapshot.cursor_value.as_ref().map(ToString::to_string).as_deref(),
            cursor_record_count = snapshot.cursor_record_count,
            records = snapshot.records_since_last_checkpoint,
            "Checkpoint emitted"
        );
    }

    fn on_out_of_order_cursor(
        &self,
        pipeline: &PipelineId,
        stream: &StreamIdentity,
        violation: &OutOfOrderCursor,
    ) {
        tracing::warn!(
            pipeline = pipeline.as_str(),
            stream = %stream,
            cursor_value = %violation.value,
            watermark = %violation.watermark,
            record = violation.record_number,
            "Out-of-order cursor value; resumability is no longer guaranteed for this stream"
        );
    }
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CheckpointObserver for NoopObserver {}
