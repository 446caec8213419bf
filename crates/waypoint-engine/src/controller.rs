//! Per-stream checkpoint controller.
//!
//! One [`CheckpointController`] is built per stream per sync attempt. It
//! pairs a seeded [`CursorWatermarkTracker`] with the attempt's
//! [`CheckpointPolicy`] and is consumed when the stream's records are
//! wrapped into a [`CheckpointingSequence`]. Interval and eager checkpoint
//! release are both selected through [`CheckpointPolicyConfig::mode`].

use std::sync::Arc;

use waypoint_state::StateStore;
use waypoint_types::checkpoint::CheckpointPolicyConfig;
use waypoint_types::cursor::{CursorError, CursorPosition, CursorType, CursorValue};
use waypoint_types::state::PipelineId;
use waypoint_types::stream::StreamIdentity;

use crate::comparator::CursorComparator;
use crate::errors::SyncError;
use crate::observer::CheckpointObserver;
use crate::policy::CheckpointPolicy;
use crate::sequence::CheckpointingSequence;
use crate::watermark::CursorWatermarkTracker;

/// Tracker and policy for one stream of one sync attempt.
#[derive(Debug)]
pub struct CheckpointController<A> {
    tracker: CursorWatermarkTracker<A>,
    policy: CheckpointPolicy,
}

impl<A> CheckpointController<A> {
    /// Build a controller seeded at `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the initial cursor value is not valid for
    /// `cursor_type`.
    pub fn new(
        stream: StreamIdentity,
        initial: CursorPosition,
        cursor_type: CursorType,
        policy_config: &CheckpointPolicyConfig,
        accessor: A,
    ) -> Result<Self, CursorError> {
        let policy = CheckpointPolicy::new(policy_config);
        let tracker = CursorWatermarkTracker::new(
            stream,
            initial,
            CursorComparator::new(cursor_type),
            accessor,
            policy.is_enabled(),
        )?;
        Ok(Self { tracker, policy })
    }

    /// Build a controller seeded from the stream's last durable checkpoint.
    ///
    /// A persisted cursor value takes precedence over `configured_initial`;
    /// the configured value only seeds streams with no prior progress, and
    /// does so with a record count of zero.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] if the store cannot be read, or
    /// [`SyncError::Cursor`] if the seed is not valid for `cursor_type`.
    pub fn seeded_from_store(
        store: &dyn StateStore,
        pipeline: &PipelineId,
        stream: StreamIdentity,
        cursor_type: CursorType,
        configured_initial: Option<CursorValue>,
        policy_config: &CheckpointPolicyConfig,
        accessor: A,
    ) -> Result<Self, SyncError> {
        let persisted = store
            .load_cursor(pipeline, &stream)?
            .filter(|state| state.position.value.is_some());

        let initial = match persisted {
            Some(state) => {
                tracing::info!(
                    pipeline = pipeline.as_str(),
                    stream = %stream,
                    checkpoint_id = state.checkpoint_id,
                    cursor_value = state.position.value.as_ref().map(ToString::to_string).as_deref(),
                    cursor_record_count = state.position.record_count,
                    "Resuming from persisted cursor"
                );
                state.position
            }
            None => {
                tracing::debug!(
                    pipeline = pipeline.as_str(),
                    stream = %stream,
                    configured = configured_initial.is_some(),
                    "No persisted cursor, starting from configured initial value"
                );
                CursorPosition::new(configured_initial, 0)
            }
        };

        Self::new(stream.clone(), initial, cursor_type, policy_config, accessor)
            .map_err(|source| SyncError::Cursor { stream, source })
    }

    #[must_use]
    pub fn tracker(&self) -> &CursorWatermarkTracker<A> {
        &self.tracker
    }

    #[must_use]
    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    #[must_use]
    pub fn into_parts(self) -> (CursorWatermarkTracker<A>, CheckpointPolicy) {
        (self.tracker, self.policy)
    }

    /// Wrap `records` into the stream's checkpointing sequence.
    pub fn into_sequence<I>(
        self,
        records: I,
        store: Arc<dyn StateStore>,
        pipeline: PipelineId,
        observer: Arc<dyn CheckpointObserver>,
    ) -> CheckpointingSequence<I, A> {
        CheckpointingSequence::new(
            records,
            self.tracker,
            self.policy,
            store,
            pipeline,
            observer,
        )
    }
}
