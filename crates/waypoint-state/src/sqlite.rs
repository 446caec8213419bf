//! `SQLite`-backed implementation of [`StateStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use waypoint_types::checkpoint::CheckpointSnapshot;
use waypoint_types::cursor::{CursorPosition, CursorValue};
use waypoint_types::state::{CursorState, PipelineId, RunStats, RunStatus};
use waypoint_types::stream::StreamIdentity;

use crate::backend::StateStore;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS sync_cursors (
    pipeline TEXT NOT NULL,
    namespace TEXT NOT NULL DEFAULT '',
    stream TEXT NOT NULL,
    cursor_value TEXT,
    cursor_record_count INTEGER NOT NULL DEFAULT 0,
    checkpoint_id INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (pipeline, namespace, stream)
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    namespace TEXT NOT NULL DEFAULT '',
    stream TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_read INTEGER DEFAULT 0,
    checkpoints_emitted INTEGER DEFAULT 0,
    out_of_order_cursors INTEGER DEFAULT 0,
    error_message TEXT
);
";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateStore::open`] for file-backed persistence
/// or [`SqliteStateStore::in_memory`] for tests.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        tracing::debug!(path = %path.display(), "Opened sqlite state store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Format current UTC time for `SQLite` storage.
    fn now_sqlite() -> String {
        Utc::now().format(SQLITE_DATETIME_FMT).to_string()
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn encode_value(value: Option<&CursorValue>) -> error::Result<Option<String>> {
        value
            .map(serde_json::to_string)
            .transpose()
            .map_err(StateError::from)
    }

    fn decode_value(raw: Option<&str>) -> error::Result<Option<CursorValue>> {
        raw.map(serde_json::from_str)
            .transpose()
            .map_err(StateError::from)
    }

    #[cfg(test)]
    fn get_run_row(
        &self,
        run_id: i64,
    ) -> error::Result<(String, i64, i64, Option<String>, Option<String>)> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT status, records_read, out_of_order_cursors, finished_at, error_message \
             FROM sync_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .map_err(StateError::backend)
    }
}

impl StateStore for SqliteStateStore {
    #[allow(clippy::cast_sign_loss)]
    fn load_cursor(
        &self,
        pipeline: &PipelineId,
        stream: &StreamIdentity,
    ) -> error::Result<Option<CursorState>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT cursor_value, cursor_record_count, checkpoint_id, updated_at \
                 FROM sync_cursors WHERE pipeline = ?1 AND namespace = ?2 AND stream = ?3",
                rusqlite::params![
                    pipeline.as_str(),
                    stream.namespace_or_empty(),
                    stream.name
                ],
                |row| {
                    let cursor_value: Option<String> = row.get(0)?;
                    let record_count: i64 = row.get(1)?;
                    let checkpoint_id: i64 = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok((cursor_value, record_count, checkpoint_id, updated_at))
                },
            )
            .optional()
            .map_err(|e| StateError::backend_context("load_cursor", e))?;

        let Some((cursor_value, record_count, checkpoint_id, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CursorState {
            position: CursorPosition::new(
                Self::decode_value(cursor_value.as_deref())?,
                record_count as u64,
            ),
            checkpoint_id: checkpoint_id as u64,
            updated_at: Self::sqlite_to_iso8601(&updated_at),
        }))
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn persist_and_snapshot(
        &self,
        pipeline: &PipelineId,
        stream: &StreamIdentity,
        position: &CursorPosition,
        records_since_last_checkpoint: u64,
    ) -> error::Result<CheckpointSnapshot> {
        let encoded = Self::encode_value(position.value.as_ref())?;
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("persist_and_snapshot: begin tx", e))?;

        let previous: Option<i64> = tx
            .query_row(
                "SELECT checkpoint_id FROM sync_cursors \
                 WHERE pipeline = ?1 AND namespace = ?2 AND stream = ?3",
                rusqlite::params![
                    pipeline.as_str(),
                    stream.namespace_or_empty(),
                    stream.name
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StateError::backend_context("persist_and_snapshot: read id", e))?;
        let checkpoint_id = previous.unwrap_or(0) + 1;

        tx.execute(
            "INSERT INTO sync_cursors \
             (pipeline, namespace, stream, cursor_value, cursor_record_count, checkpoint_id, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(pipeline, namespace, stream) \
             DO UPDATE SET cursor_value = ?4, cursor_record_count = ?5, \
             checkpoint_id = ?6, updated_at = ?7",
            rusqlite::params![
                pipeline.as_str(),
                stream.namespace_or_empty(),
                stream.name,
                encoded,
                position.record_count as i64,
                checkpoint_id,
                Self::now_sqlite(),
            ],
        )
        .map_err(|e| StateError::backend_context("persist_and_snapshot: upsert", e))?;
        tx.commit()
            .map_err(|e| StateError::backend_context("persist_and_snapshot: commit", e))?;

        Ok(CheckpointSnapshot {
            id: checkpoint_id as u64,
            stream: stream.clone(),
            cursor_value: position.value.clone(),
            cursor_record_count: position.record_count,
            records_since_last_checkpoint,
        })
    }

    fn start_run(&self, pipeline: &PipelineId, stream: &StreamIdentity) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sync_runs (pipeline, namespace, stream, status) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                pipeline.as_str(),
                stream.namespace_or_empty(),
                stream.name,
                RunStatus::Running.as_str()
            ],
        )
        .map_err(|e| StateError::backend_context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = datetime('now'), \
             records_read = ?2, checkpoints_emitted = ?3, out_of_order_cursors = ?4, \
             error_message = ?5 WHERE id = ?6",
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.checkpoints_emitted as i64,
                stats.out_of_order_cursors as i64,
                stats.error_message,
                run_id,
            ],
        )
        .map_err(|e| StateError::backend_context("complete_run", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(name: &str) -> PipelineId {
        PipelineId::new(name)
    }

    fn stream(name: &str) -> StreamIdentity {
        StreamIdentity::new(name).with_namespace("public")
    }

    fn at(value: i64, count: u64) -> CursorPosition {
        CursorPosition::new(Some(CursorValue::int64(value)), count)
    }

    #[test]
    fn cursor_roundtrip() {
        let store = SqliteStateStore::in_memory().unwrap();
        assert!(store.load_cursor(&pid("p"), &stream("s")).unwrap().is_none());

        let position = CursorPosition::new(Some(CursorValue::utf8("2024-01-15T10:00:00Z")), 2);
        let cp = store
            .persist_and_snapshot(&pid("p"), &stream("s"), &position, 10)
            .unwrap();
        assert_eq!(cp.id, 1);
        assert_eq!(cp.records_since_last_checkpoint, 10);
        assert_eq!(cp.position(), position);

        let cursor = store.load_cursor(&pid("p"), &stream("s")).unwrap().unwrap();
        assert_eq!(cursor.position, position);
        assert_eq!(cursor.checkpoint_id, 1);
        assert!(cursor.updated_at.ends_with('Z'));
    }

    #[test]
    fn checkpoint_ids_increase_per_stream() {
        let store = SqliteStateStore::in_memory().unwrap();
        let a1 = store.persist_and_snapshot(&pid("p"), &stream("a"), &at(1, 1), 1).unwrap();
        let a2 = store.persist_and_snapshot(&pid("p"), &stream("a"), &at(2, 1), 1).unwrap();
        let b1 = store.persist_and_snapshot(&pid("p"), &stream("b"), &at(9, 1), 1).unwrap();
        assert_eq!((a1.id, a2.id, b1.id), (1, 2, 1));

        let a = store.load_cursor(&pid("p"), &stream("a")).unwrap().unwrap();
        assert_eq!(a.position, at(2, 1));
    }

    #[test]
    fn empty_position_persists_as_null() {
        let store = SqliteStateStore::in_memory().unwrap();
        store
            .persist_and_snapshot(&pid("p"), &stream("s"), &CursorPosition::default(), 0)
            .unwrap();
        let cursor = store.load_cursor(&pid("p"), &stream("s")).unwrap().unwrap();
        assert_eq!(cursor.position, CursorPosition::default());
    }

    #[test]
    fn namespaces_and_pipelines_independent() {
        let store = SqliteStateStore::in_memory().unwrap();
        let bare = StreamIdentity::new("s");
        store.persist_and_snapshot(&pid("a"), &stream("s"), &at(1, 1), 1).unwrap();
        store.persist_and_snapshot(&pid("b"), &stream("s"), &at(2, 1), 1).unwrap();
        store.persist_and_snapshot(&pid("a"), &bare, &at(3, 1), 1).unwrap();

        let a = store.load_cursor(&pid("a"), &stream("s")).unwrap().unwrap();
        let b = store.load_cursor(&pid("b"), &stream("s")).unwrap().unwrap();
        let a_bare = store.load_cursor(&pid("a"), &bare).unwrap().unwrap();
        assert_eq!(a.position, at(1, 1));
        assert_eq!(b.position, at(2, 1));
        assert_eq!(a_bare.position, at(3, 1));
    }

    #[test]
    fn run_lifecycle() {
        let store = SqliteStateStore::in_memory().unwrap();
        let run_id = store.start_run(&pid("p"), &stream("s")).unwrap();
        assert!(run_id > 0);

        store
            .complete_run(
                run_id,
                RunStatus::Completed,
                &RunStats {
                    records_read: 1000,
                    checkpoints_emitted: 4,
                    out_of_order_cursors: 2,
                    error_message: None,
                },
            )
            .unwrap();

        let (status, records_read, out_of_order, finished, _error) =
            store.get_run_row(run_id).unwrap();
        assert_eq!(status, "completed");
        assert_eq!(records_read, 1000);
        assert_eq!(out_of_order, 2);
        assert!(finished.is_some());
    }

    #[test]
    fn run_failure() {
        let store = SqliteStateStore::in_memory().unwrap();
        let run_id = store.start_run(&pid("p"), &stream("orders")).unwrap();

        store
            .complete_run(
                run_id,
                RunStatus::Failed,
                &RunStats {
                    records_read: 50,
                    error_message: Some("Connection reset".into()),
                    ..RunStats::default()
                },
            )
            .unwrap();

        let (status, _records, _ooo, _finished, error_msg) = store.get_run_row(run_id).unwrap();
        assert_eq!(status, "failed");
        assert_eq!(error_msg, Some("Connection reset".into()));
    }

    #[test]
    fn multiple_runs() {
        let store = SqliteStateStore::in_memory().unwrap();
        let run1 = store.start_run(&pid("p"), &stream("s")).unwrap();
        let run2 = store.start_run(&pid("p"), &stream("s")).unwrap();
        assert!(run2 > run1);
    }

    #[test]
    fn corrupt_cursor_value_is_a_serialization_error() {
        let store = SqliteStateStore::in_memory().unwrap();
        store
            .lock_conn()
            .unwrap()
            .execute(
                "INSERT INTO sync_cursors (pipeline, namespace, stream, cursor_value) \
                 VALUES ('p', 'public', 's', 'not json')",
                [],
            )
            .unwrap();
        let err = store.load_cursor(&pid("p"), &stream("s")).unwrap_err();
        assert!(matches!(err, StateError::Serialization(_)), "got: {err}");
    }

    #[test]
    fn sqlite_to_iso8601_conversion() {
        let iso = SqliteStateStore::sqlite_to_iso8601("2024-01-15 10:00:00");
        assert_eq!(iso, "2024-01-15T10:00:00Z");
    }
}
