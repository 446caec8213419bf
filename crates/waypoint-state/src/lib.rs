//! Durable cursor state for the Waypoint engine.
//!
//! Provides the [`StateStore`] trait and a [`SqliteStateStore`]
//! implementation for per-stream watermarks, checkpoint sequencing, and
//! run history.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::StateStore;
pub use error::StateError;
pub use sqlite::SqliteStateStore;

/// Common imports for state store consumers.
pub mod prelude {
    pub use crate::backend::StateStore;
    pub use crate::error::StateError;
    pub use crate::sqlite::SqliteStateStore;
    pub use waypoint_types::checkpoint::CheckpointSnapshot;
    pub use waypoint_types::cursor::{CursorPosition, CursorValue};
    pub use waypoint_types::state::{CursorState, PipelineId, RunStats, RunStatus};
    pub use waypoint_types::stream::StreamIdentity;
}
