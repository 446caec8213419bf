//! Sync configuration types, deserialized from YAML.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use waypoint_state::{SqliteStateStore, StateStore};
use waypoint_types::checkpoint::CheckpointPolicyConfig;
use waypoint_types::cursor::{CursorError, CursorType, CursorValue};
use waypoint_types::stream::StreamIdentity;

pub use waypoint_types::checkpoint::parse_duration;

/// Top-level sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub version: String,
    pub pipeline: String,
    #[serde(default)]
    pub state: StateConfig,
    /// Default checkpoint policy for every stream.
    #[serde(default)]
    pub checkpoint: CheckpointPolicyConfig,
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
    Memory,
}

/// Where cursor state and run history are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    /// SQLite database file. Defaults to `~/.waypoint/state.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StateConfig {
    /// Open the configured state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite database cannot be opened or created.
    pub fn open(&self) -> Result<Arc<dyn StateStore>> {
        let store = match self.backend {
            StateBackendKind::Sqlite => {
                let path = self.path.clone().unwrap_or_else(default_state_path);
                SqliteStateStore::open(&path)
                    .with_context(|| format!("Failed to open state DB: {}", path.display()))?
            }
            StateBackendKind::Memory => {
                SqliteStateStore::in_memory().context("Failed to open in-memory state DB")?
            }
        };
        Ok(Arc::new(store) as Arc<dyn StateStore>)
    }
}

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    Path::new(&home).join(".waypoint").join("state.db")
}

/// One incrementally synced stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Dot-separated path to the cursor field in each record.
    pub cursor_field: String,
    pub cursor_type: CursorType,
    /// Starting cursor for a stream with no persisted progress.
    #[serde(default)]
    pub initial_cursor: Option<String>,
    /// Replaces the sync-wide checkpoint policy for this stream.
    #[serde(default)]
    pub checkpoint: Option<CheckpointPolicyConfig>,
}

impl StreamConfig {
    /// State key for this stream. A blank namespace is the same as none.
    #[must_use]
    pub fn identity(&self) -> StreamIdentity {
        let stream = StreamIdentity::new(self.name.clone());
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => stream.with_namespace(ns),
            _ => stream,
        }
    }

    /// Parse `initial_cursor` under `cursor_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the configured value does not parse.
    pub fn initial_cursor_value(&self) -> Result<Option<CursorValue>, CursorError> {
        self.initial_cursor
            .as_deref()
            .map(|raw| CursorValue::parse(raw, self.cursor_type))
            .transpose()
    }

    /// The effective checkpoint policy, given the sync-wide default.
    #[must_use]
    pub fn policy(&self, default: &CheckpointPolicyConfig) -> CheckpointPolicyConfig {
        self.checkpoint.unwrap_or(*default)
    }
}
