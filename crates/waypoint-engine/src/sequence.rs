//! Lazy record sequence with interleaved checkpoints.
//!
//! [`CheckpointingSequence`] wraps a stream's record iterator and yields
//! [`SyncItem`]s: every record, in order, plus checkpoints released by the
//! [`CheckpointPolicy`] and exactly one terminal checkpoint once the records
//! run out. The policy is consulted *before* each pull, and pending
//! checkpoints are captured from the watermark state prior to the record
//! that advanced it, so a checkpoint yielded at pull `k` only covers records
//! yielded at pulls before `k`.

use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Instant;

use waypoint_state::StateStore;
use waypoint_types::checkpoint::CheckpointSnapshot;
use waypoint_types::cursor::CursorPosition;
use waypoint_types::state::PipelineId;

use crate::accessor::CursorAccessor;
use crate::errors::{BoxError, SyncError};
use crate::observer::CheckpointObserver;
use crate::policy::CheckpointPolicy;
use crate::watermark::{CursorWatermarkTracker, Observation};

/// One item of a checkpointing sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncItem<R> {
    Record(R),
    Checkpoint(CheckpointSnapshot),
}

impl<R> SyncItem<R> {
    #[must_use]
    pub fn as_checkpoint(&self) -> Option<&CheckpointSnapshot> {
        match self {
            Self::Checkpoint(snapshot) => Some(snapshot),
            Self::Record(_) => None,
        }
    }

    #[must_use]
    pub fn into_record(self) -> Option<R> {
        match self {
            Self::Record(record) => Some(record),
            Self::Checkpoint(_) => None,
        }
    }
}

/// Lifecycle of a [`CheckpointingSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// The underlying records may have more items.
    Streaming,
    /// Records are exhausted; the terminal checkpoint has not been yielded.
    Finalizing,
    /// Terminal. Every further pull returns `None`.
    Done,
}

/// Counters for one pull-through of a sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub records_emitted: u64,
    pub checkpoints_emitted: u64,
    pub out_of_order_cursors: u64,
}

/// Single-pass, single-consumer sequence of records and checkpoints for one
/// stream.
///
/// Checkpoints are persisted through the [`StateStore`] before they are
/// yielded. Any failure (record read, cursor interpretation, persistence)
/// is yielded once, after which the sequence is exhausted without a
/// terminal checkpoint.
pub struct CheckpointingSequence<I, A> {
    records: I,
    tracker: CursorWatermarkTracker<A>,
    policy: CheckpointPolicy,
    store: Arc<dyn StateStore>,
    pipeline: PipelineId,
    observer: Arc<dyn CheckpointObserver>,
    state: SequenceState,
    records_since_checkpoint: u64,
    /// Start of the current interval. Set on the first pull.
    last_checkpoint_at: Option<Instant>,
    stats: SequenceStats,
}

impl<I, A> CheckpointingSequence<I, A> {
    pub fn new(
        records: I,
        tracker: CursorWatermarkTracker<A>,
        policy: CheckpointPolicy,
        store: Arc<dyn StateStore>,
        pipeline: PipelineId,
        observer: Arc<dyn CheckpointObserver>,
    ) -> Self {
        Self {
            records,
            tracker,
            policy,
            store,
            pipeline,
            observer,
            state: SequenceState::Streaming,
            records_since_checkpoint: 0,
            last_checkpoint_at: None,
            stats: SequenceStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    #[must_use]
    pub fn tracker(&self) -> &CursorWatermarkTracker<A> {
        &self.tracker
    }

    /// Persist `position` and turn it into a yielded checkpoint.
    fn emit(&mut self, position: &CursorPosition) -> Result<CheckpointSnapshot, SyncError> {
        let snapshot = self.store.persist_and_snapshot(
            &self.pipeline,
            self.tracker.stream(),
            position,
            self.records_since_checkpoint,
        );
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.state = SequenceState::Done;
                return Err(e.into());
            }
        };
        self.records_since_checkpoint = 0;
        self.last_checkpoint_at = Some(Instant::now());
        self.stats.checkpoints_emitted += 1;
        self.observer.on_checkpoint(&self.pipeline, &snapshot);
        Ok(snapshot)
    }

    fn finish(&mut self) -> Result<CheckpointSnapshot, SyncError> {
        self.state = SequenceState::Done;
        let last = self.tracker.final_snapshot();
        tracing::debug!(
            pipeline = self.pipeline.as_str(),
            stream = %self.tracker.stream(),
            records = self.stats.records_emitted,
            "Record source exhausted, emitting terminal checkpoint"
        );
        self.emit(&last.position)
    }

    /// Fuse the sequence and hand back the error to yield.
    fn fail(&mut self, err: SyncError) -> SyncError {
        self.state = SequenceState::Done;
        tracing::debug!(
            pipeline = self.pipeline.as_str(),
            stream = %self.tracker.stream(),
            error = %err,
            "Checkpointing sequence aborted"
        );
        err
    }
}

impl<I, A, R, E> Iterator for CheckpointingSequence<I, A>
where
    I: Iterator<Item = Result<R, E>>,
    E: Into<BoxError>,
    A: CursorAccessor<R>,
{
    type Item = Result<SyncItem<R>, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            SequenceState::Done => return None,
            SequenceState::Finalizing => {
                return Some(self.finish().map(SyncItem::Checkpoint));
            }
            SequenceState::Streaming => {}
        }

        let interval_start = *self.last_checkpoint_at.get_or_insert_with(Instant::now);
        if self.policy.should_checkpoint_now(
            self.records_since_checkpoint,
            interval_start.elapsed(),
            self.tracker.has_pending(),
        ) {
            if let Some(pending) = self.tracker.take_pending_snapshot() {
                return Some(self.emit(&pending.position).map(SyncItem::Checkpoint));
            }
        }

        let record = match self.records.next() {
            None => {
                self.state = SequenceState::Finalizing;
                return Some(self.finish().map(SyncItem::Checkpoint));
            }
            Some(Err(e)) => {
                let err = SyncError::RecordRead {
                    stream: self.tracker.stream().clone(),
                    source: e.into(),
                };
                return Some(Err(self.fail(err)));
            }
            Some(Ok(record)) => record,
        };

        match self.tracker.observe(&record) {
            Ok(Observation::OutOfOrder(violation)) => {
                self.stats.out_of_order_cursors += 1;
                self.observer
                    .on_out_of_order_cursor(&self.pipeline, self.tracker.stream(), &violation);
            }
            Ok(_) => {}
            Err(source) => {
                let err = SyncError::Cursor {
                    stream: self.tracker.stream().clone(),
                    source,
                };
                return Some(Err(self.fail(err)));
            }
        }

        self.records_since_checkpoint += 1;
        self.stats.records_emitted += 1;
        Some(Ok(SyncItem::Record(record)))
    }
}

impl<I, A, R, E> FusedIterator for CheckpointingSequence<I, A>
where
    I: Iterator<Item = Result<R, E>>,
    E: Into<BoxError>,
    A: CursorAccessor<R>,
{
}
