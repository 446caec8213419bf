//! Checkpointing engine for Waypoint incremental syncs.
//!
//! Wraps each stream's record source in a [`CheckpointingSequence`] that
//! interleaves durable, resumable checkpoints with the records themselves.

pub mod accessor;
pub mod comparator;
pub mod config;
pub mod controller;
pub mod errors;
pub mod observer;
pub mod policy;
pub mod runner;
pub mod sequence;
pub mod watermark;

// Re-export public API for convenience
pub use accessor::{CursorAccessor, JsonFieldAccessor};
pub use comparator::CursorComparator;
pub use controller::CheckpointController;
pub use errors::SyncError;
pub use observer::{CheckpointObserver, TracingObserver};
pub use policy::CheckpointPolicy;
pub use runner::{run_stream, run_streams, RecordSink, StreamRunResult, StreamTask, SyncContext};
pub use sequence::{CheckpointingSequence, SequenceState, SequenceStats, SyncItem};
pub use watermark::{CursorWatermarkTracker, Observation, OutOfOrderCursor, PendingCheckpoint};
