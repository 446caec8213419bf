//! State store model types.
//!
//! Pure data types used by `StateStore` implementations. Kept in the types
//! crate so both the engine and the state crate can share them without
//! circular dependencies.

use serde::{Deserialize, Serialize};

use crate::cursor::CursorPosition;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque pipeline identifier; scopes all per-stream state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    /// Create a new pipeline identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for PipelineId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Terminal status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for one stream's sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_read: u64,
    pub checkpoints_emitted: u64,
    /// Records whose cursor compared below the watermark.
    pub out_of_order_cursors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Cursor state
// ---------------------------------------------------------------------------

/// Persisted cursor for a (pipeline, stream) pair.
///
/// `updated_at` is an ISO-8601 UTC string (e.g. `"2026-01-15T10:00:00Z"`).
/// Stores handle timestamp formatting internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    /// Last durable watermark.
    pub position: CursorPosition,
    /// Sequence number of the checkpoint that wrote this state.
    pub checkpoint_id: u64,
    /// ISO-8601 UTC timestamp of when this cursor was last written.
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorValue;

    #[test]
    fn pipeline_id_display_and_as_str() {
        let pid = PipelineId::new("my-pipeline");
        assert_eq!(pid.as_str(), "my-pipeline");
        assert_eq!(pid.to_string(), "my-pipeline");
    }

    #[test]
    fn pipeline_id_serde_transparent() {
        let pid = PipelineId::new("test");
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, "\"test\"");
    }

    #[test]
    fn run_status_as_str() {
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert_eq!(RunStatus::Completed.as_str(), "completed");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn run_stats_default_is_zeroed() {
        let stats = RunStats::default();
        assert_eq!(stats.records_read, 0);
        assert_eq!(stats.checkpoints_emitted, 0);
        assert_eq!(stats.out_of_order_cursors, 0);
        assert!(stats.error_message.is_none());
    }

    #[test]
    fn cursor_state_serde_roundtrip() {
        let cs = CursorState {
            position: CursorPosition::new(Some(CursorValue::int64(42)), 3),
            checkpoint_id: 7,
            updated_at: "2026-01-15T10:00:00Z".into(),
        };
        let json = serde_json::to_string(&cs).unwrap();
        let back: CursorState = serde_json::from_str(&json).unwrap();
        assert_eq!(cs, back);
    }
}
