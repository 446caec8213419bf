//! Stream runner: drives checkpointing sequences into record sinks.
//!
//! [`run_stream`] performs one sync attempt for one stream: it records a run
//! in the state store, seeds a [`CheckpointController`] from the last durable
//! checkpoint, forwards records and checkpoints to a [`RecordSink`], and
//! finalizes the run with its stats. [`run_streams`] runs several streams
//! concurrently, one scoped worker thread per stream.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use waypoint_state::StateStore;
use waypoint_types::checkpoint::{CheckpointPolicyConfig, CheckpointSnapshot};
use waypoint_types::state::{PipelineId, RunStats, RunStatus};
use waypoint_types::stream::StreamIdentity;

use crate::accessor::CursorAccessor;
use crate::config::types::{StreamConfig, SyncConfig};
use crate::config::validator::validate_sync;
use crate::controller::CheckpointController;
use crate::errors::{BoxError, SyncError};
use crate::observer::{CheckpointObserver, TracingObserver};
use crate::sequence::{SequenceStats, SyncItem};

/// Destination side of a stream sync.
pub trait RecordSink<R> {
    /// Accept one record.
    ///
    /// # Errors
    ///
    /// Any error aborts the stream's sync attempt.
    fn write_record(&mut self, record: R) -> Result<(), BoxError>;

    /// Called after a checkpoint has been persisted, in stream order.
    ///
    /// # Errors
    ///
    /// Any error aborts the stream's sync attempt.
    fn on_checkpoint(&mut self, _checkpoint: &CheckpointSnapshot) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<R> RecordSink<R> for Vec<R> {
    fn write_record(&mut self, record: R) -> Result<(), BoxError> {
        self.push(record);
        Ok(())
    }
}

/// Shared, per-sync collaborators for every stream run.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn StateStore>,
    pub pipeline: PipelineId,
    /// Checkpoint policy for streams without an override.
    pub default_policy: CheckpointPolicyConfig,
    pub observer: Arc<dyn CheckpointObserver>,
}

impl SyncContext {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, pipeline: PipelineId) -> Self {
        Self {
            store,
            pipeline,
            default_policy: CheckpointPolicyConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CheckpointPolicyConfig) -> Self {
        self.default_policy = policy;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CheckpointObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate `config` and open its state store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if validation fails or the state store
    /// cannot be opened.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        validate_sync(config)?;
        let store = config.state.open()?;
        Ok(Self::new(store, PipelineId::new(config.pipeline.clone()))
            .with_policy(config.checkpoint))
    }
}

/// Outcome of one successful stream sync attempt.
#[derive(Debug, Clone)]
pub struct StreamRunResult {
    pub stream: StreamIdentity,
    pub run_id: i64,
    pub duration_secs: f64,
    pub records_read: u64,
    /// Every checkpoint yielded, in order; the last is the terminal one.
    pub checkpoints: Vec<CheckpointSnapshot>,
    pub out_of_order_cursors: u64,
}

impl StreamRunResult {
    #[must_use]
    pub fn final_checkpoint(&self) -> Option<&CheckpointSnapshot> {
        self.checkpoints.last()
    }
}

/// Run one sync attempt for one stream.
///
/// The run is recorded in the state store as `completed` or `failed`. On
/// failure the last checkpoint already passed to the sink remains the
/// stream's resume point.
///
/// # Errors
///
/// Returns the [`SyncError`] that aborted the attempt.
pub fn run_stream<R, I, E, A, S>(
    ctx: &SyncContext,
    stream: &StreamConfig,
    accessor: A,
    records: I,
    sink: &mut S,
) -> Result<StreamRunResult, SyncError>
where
    I: IntoIterator<Item = Result<R, E>>,
    E: Into<BoxError>,
    A: CursorAccessor<R>,
    S: RecordSink<R> + ?Sized,
{
    let start = Instant::now();
    let identity = stream.identity();
    let run_id = ctx.store.start_run(&ctx.pipeline, &identity)?;
    tracing::info!(
        pipeline = ctx.pipeline.as_str(),
        stream = %identity,
        run_id,
        cursor_field = stream.cursor_field.as_str(),
        cursor_type = %stream.cursor_type,
        "Stream sync started"
    );

    let policy = stream.policy(&ctx.default_policy);
    let mut checkpoints = Vec::new();
    let mut stats = SequenceStats::default();

    let outcome = stream
        .initial_cursor_value()
        .map_err(|source| SyncError::Cursor {
            stream: identity.clone(),
            source,
        })
        .and_then(|initial| {
            CheckpointController::seeded_from_store(
                ctx.store.as_ref(),
                &ctx.pipeline,
                identity.clone(),
                stream.cursor_type,
                initial,
                &policy,
                accessor,
            )
        })
        .and_then(|controller| {
            let mut sequence = controller.into_sequence(
                records.into_iter(),
                Arc::clone(&ctx.store),
                ctx.pipeline.clone(),
                Arc::clone(&ctx.observer),
            );
            let forwarded = forward(&mut sequence, sink, &identity, &mut checkpoints);
            stats = sequence.stats();
            forwarded
        });

    let duration_secs = start.elapsed().as_secs_f64();
    let mut run_stats = RunStats {
        records_read: stats.records_emitted,
        checkpoints_emitted: stats.checkpoints_emitted,
        out_of_order_cursors: stats.out_of_order_cursors,
        error_message: None,
    };

    match outcome {
        Ok(()) => {
            ctx.store
                .complete_run(run_id, RunStatus::Completed, &run_stats)?;
            tracing::info!(
                pipeline = ctx.pipeline.as_str(),
                stream = %identity,
                run_id,
                records = run_stats.records_read,
                checkpoints = run_stats.checkpoints_emitted,
                out_of_order = run_stats.out_of_order_cursors,
                duration_secs,
                "Stream sync completed"
            );
            Ok(StreamRunResult {
                stream: identity,
                run_id,
                duration_secs,
                records_read: run_stats.records_read,
                checkpoints,
                out_of_order_cursors: run_stats.out_of_order_cursors,
            })
        }
        Err(err) => {
            run_stats.error_message = Some(err.to_string());
            if let Err(e) = ctx.store.complete_run(run_id, RunStatus::Failed, &run_stats) {
                tracing::warn!(
                    pipeline = ctx.pipeline.as_str(),
                    stream = %identity,
                    run_id,
                    error = %e,
                    "Failed to record failed run"
                );
            }
            tracing::error!(
                pipeline = ctx.pipeline.as_str(),
                stream = %identity,
                run_id,
                records = run_stats.records_read,
                checkpoints = run_stats.checkpoints_emitted,
                retryable = err.is_retryable(),
                error = %err,
                "Stream sync failed"
            );
            Err(err)
        }
    }
}

fn forward<R, S>(
    items: impl Iterator<Item = Result<SyncItem<R>, SyncError>>,
    sink: &mut S,
    stream: &StreamIdentity,
    checkpoints: &mut Vec<CheckpointSnapshot>,
) -> Result<(), SyncError>
where
    S: RecordSink<R> + ?Sized,
{
    let sink_err = |source| SyncError::Sink {
        stream: stream.clone(),
        source,
    };
    for item in items {
        match item? {
            SyncItem::Record(record) => sink.write_record(record).map_err(sink_err)?,
            SyncItem::Checkpoint(checkpoint) => {
                sink.on_checkpoint(&checkpoint).map_err(sink_err)?;
                checkpoints.push(checkpoint);
            }
        }
    }
    Ok(())
}

/// One stream's inputs for [`run_streams`].
pub struct StreamTask<'a, I, A, S: ?Sized> {
    pub config: &'a StreamConfig,
    pub accessor: A,
    pub records: I,
    pub sink: &'a mut S,
}

/// Run several streams concurrently, one scoped worker thread per stream.
///
/// Streams share only the state store; each checkpoints independently.
/// Results are returned in task order. A panic in a worker is propagated.
pub fn run_streams<R, I, E, A, S>(
    ctx: &SyncContext,
    tasks: Vec<StreamTask<'_, I, A, S>>,
) -> Vec<Result<StreamRunResult, SyncError>>
where
    I: IntoIterator<Item = Result<R, E>> + Send,
    E: Into<BoxError>,
    A: CursorAccessor<R> + Send,
    S: RecordSink<R> + Send + ?Sized,
{
    thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                scope.spawn(move || {
                    run_stream(ctx, task.config, task.accessor, task.records, task.sink)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}
