//! Storage layer for the productivity tracker.
//!
//! Provides persistence for timers, daily summaries, period snapshots and the
//! collaborator rows the retention sweeper prunes, using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Callers that serve concurrent requests open one `Database` per request; the
//! invariants below hold across connections and across processes because they are
//! enforced by SQLite itself, not by in-process locks.
//!
//! # Invariants enforced by the schema
//!
//! - One live timer per user: a partial unique index on `timers(user_id)` restricted
//!   to `status IN ('running', 'paused')`.
//! - Linearized timer moves: every update is conditioned on the previously read
//!   `status` and `version`.
//! - One summary row per `(user_id, date)`, mutated only by upsert-increment.
//! - One snapshot per `(user_id, start_date)`.
//!
//! # Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision and a `Z`
//! suffix (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering. Calendar days are stored as `YYYY-MM-DD`.

mod collaborators;
mod ledger;
mod periods;
mod sweep;
mod timers;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The user already has a running or paused timer.
    #[error("user {user} already has a live timer")]
    LiveTimerExists { user: String },
    /// A timer row no longer matches the state a move was computed from.
    #[error("timer {id} was modified concurrently (expected {expected_status} at version {expected_version})")]
    StaleTimer {
        id: String,
        expected_status: String,
        expected_version: i64,
    },
    /// A task save named a task owned by someone else.
    #[error("task {task} belongs to another user")]
    TaskOwnership { task: String },
    /// A snapshot for this period was already written.
    #[error("period snapshot for {user} starting {start_date} already exists")]
    SnapshotExists { user: String, start_date: String },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {context}: {timestamp}")]
    TimestampParse {
        context: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value could not be decoded.
    #[error("invalid data in {context}: {message}")]
    InvalidData { context: String, message: String },
}

impl DbError {
    /// Whether the error is a rejected conditional write rather than a storage fault.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::LiveTimerExists { .. }
                | Self::StaleTimer { .. }
                | Self::TaskOwnership { .. }
                | Self::SnapshotExists { .. }
        )
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::trace!(path = %path.display(), journal, "opened database");
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Users known to the pipeline; the scheduler iterates this table.
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            -- pauses: JSON array of {start, end?}
            -- tags: JSON array of strings
            CREATE TABLE IF NOT EXISTS timers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_seconds INTEGER,
                status TEXT NOT NULL CHECK (status IN ('running', 'paused', 'completed')),
                pauses TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_timers_one_live
                ON timers(user_id) WHERE status IN ('running', 'paused');
            CREATE INDEX IF NOT EXISTS idx_timers_user_updated ON timers(user_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_timers_user_created ON timers(user_id, created_at);

            CREATE TABLE IF NOT EXISTS daily_summaries (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                total_work_seconds INTEGER NOT NULL DEFAULT 0,
                total_break_seconds INTEGER NOT NULL DEFAULT 0,
                completed_tasks_count INTEGER NOT NULL DEFAULT 0,
                productivity_score INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, date)
            );

            -- One row per applied contribution; makes re-application a no-op.
            CREATE TABLE IF NOT EXISTS ledger_events (
                key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_events_user_applied
                ON ledger_events(user_id, applied_at);

            CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                period_length_days INTEGER NOT NULL CHECK (period_length_days >= 1),
                current_period_start TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS period_snapshots (
                user_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                total_work_seconds INTEGER NOT NULL,
                total_break_seconds INTEGER NOT NULL,
                average_productivity REAL,
                completed_tasks_count INTEGER NOT NULL DEFAULT 0,
                days_tracked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, start_date)
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT,
                status TEXT NOT NULL CHECK (status IN ('todo', 'in_progress', 'done')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status, updated_at);

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            ",
        )?;
        Ok(())
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(timestamp: &str, context: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            context: context.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_date(date: NaiveDate) -> String {
    pt_core::format_day(date)
}

fn parse_date(date: &str, context: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|source| DbError::TimestampParse {
        context: context.to_string(),
        timestamp: date.to_string(),
        source,
    })
}

fn invalid_data(context: &str, message: impl ToString) -> DbError {
    DbError::InvalidData {
        context: context.to_string(),
        message: message.to_string(),
    }
}

/// Whether `err` is a UNIQUE or PRIMARY KEY constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn open_file_database_uses_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open(&dir.path().join("pt.db")).expect("open db");
        let mode: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn init_is_idempotent() {
        let db = Database::open_in_memory().expect("open in-memory db");
        db.init().expect("second init");
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "timers"),
            vec![
                "id",
                "user_id",
                "start_time",
                "end_time",
                "duration_seconds",
                "status",
                "pauses",
                "description",
                "tags",
                "created_at",
                "updated_at",
                "version",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "daily_summaries"),
            vec![
                "user_id",
                "date",
                "total_work_seconds",
                "total_break_seconds",
                "completed_tasks_count",
                "productivity_score",
                "updated_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "user_settings"),
            vec![
                "user_id",
                "period_length_days",
                "current_period_start",
                "updated_at"
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "period_snapshots"),
            vec![
                "user_id",
                "start_date",
                "end_date",
                "total_work_seconds",
                "total_break_seconds",
                "average_productivity",
                "completed_tasks_count",
                "days_tracked",
                "created_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "ledger_events"),
            vec!["key", "user_id", "date", "applied_at"]
        );

        let timer_indexes = index_names(&db.conn, "timers");
        let expected: HashSet<String> = [
            "idx_timers_one_live",
            "idx_timers_user_updated",
            "idx_timers_user_created",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert!(expected.is_subset(&timer_indexes));

        assert!(index_names(&db.conn, "tasks").contains("idx_tasks_user_status"));
        assert!(index_names(&db.conn, "transactions").contains("idx_transactions_user_date"));
        assert!(index_names(&db.conn, "ledger_events").contains("idx_ledger_events_user_applied"));
    }

    #[test]
    fn live_timer_index_is_partial_and_unique() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let (unique, partial): (i64, i64) = db
            .conn
            .query_row(
                "SELECT \"unique\", partial FROM pragma_index_list('timers') WHERE name = 'idx_timers_one_live'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((unique, partial), (1, 1));
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }
}
