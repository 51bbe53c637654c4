//! User settings and period snapshots.

use chrono::{DateTime, Utc};
use pt_core::{PeriodSnapshot, UserId, UserSettings};
use rusqlite::{OptionalExtension, Row, params};

use crate::{
    Database, DbError, format_date, format_timestamp, invalid_data, is_unique_violation,
    parse_date, parse_timestamp,
};

const SNAPSHOT_COLUMNS: &str = "user_id, start_date, end_date, total_work_seconds, total_break_seconds, average_productivity, completed_tasks_count, days_tracked, created_at";

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        user_id: row.get(0)?,
        start_date: row.get(1)?,
        end_date: row.get(2)?,
        total_work_seconds: row.get(3)?,
        total_break_seconds: row.get(4)?,
        average_productivity: row.get(5)?,
        completed_tasks_count: row.get(6)?,
        days_tracked: row.get(7)?,
        created_at: row.get(8)?,
    })
}

struct SnapshotRow {
    user_id: String,
    start_date: String,
    end_date: String,
    total_work_seconds: i64,
    total_break_seconds: i64,
    average_productivity: Option<f64>,
    completed_tasks_count: i64,
    days_tracked: i64,
    created_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<PeriodSnapshot, DbError> {
        let context = format!("period snapshot {}/{}", self.user_id, self.start_date);
        Ok(PeriodSnapshot {
            user: UserId::new(self.user_id).map_err(|e| invalid_data(&context, e))?,
            start_date: parse_date(&self.start_date, &context)?,
            end_date: parse_date(&self.end_date, &context)?,
            total_work_seconds: self.total_work_seconds,
            total_break_seconds: self.total_break_seconds,
            average_productivity: self.average_productivity,
            completed_tasks_count: self.completed_tasks_count,
            days_tracked: self.days_tracked,
            created_at: parse_timestamp(&self.created_at, &context)?,
        })
    }
}

impl Database {
    /// Returns the user's settings, if they have been created.
    pub fn user_settings(&self, user: &UserId) -> Result<Option<UserSettings>, DbError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT period_length_days, current_period_start FROM user_settings WHERE user_id = ?",
                [user.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(days, start)| {
            let context = format!("settings for {user}");
            let start = parse_timestamp(&start, &context)?;
            UserSettings::new(user.clone(), days, start).map_err(|e| invalid_data(&context, e))
        })
        .transpose()
    }

    /// Returns the user's settings, storing `initial` first if none exist.
    ///
    /// Concurrent callers converge on whichever row was inserted first.
    pub fn load_or_create_settings(
        &self,
        initial: &UserSettings,
        now: DateTime<Utc>,
    ) -> Result<UserSettings, DbError> {
        let created = self.conn.execute(
            "
            INSERT OR IGNORE INTO user_settings (user_id, period_length_days, current_period_start, updated_at)
            VALUES (?, ?, ?, ?)
            ",
            params![
                initial.user.as_str(),
                initial.period_length_days,
                format_timestamp(initial.current_period_start),
                format_timestamp(now),
            ],
        )?;
        if created > 0 {
            tracing::debug!(
                user = %initial.user,
                start = %initial.current_period_start,
                "created user settings"
            );
        }
        self.user_settings(&initial.user)?.ok_or_else(|| {
            invalid_data(
                &format!("settings for {}", initial.user),
                "row missing after insert",
            )
        })
    }

    /// Stores `snapshot` and advances the user's period start from
    /// `expected_start` to `next_start`, atomically.
    ///
    /// Returns `false` without writing anything if the stored period start is
    /// no longer `expected_start`, i.e. another run already rolled this period.
    pub fn commit_rollover(
        &mut self,
        snapshot: &PeriodSnapshot,
        expected_start: DateTime<Utc>,
        next_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let tx = self.conn.transaction()?;
        let advanced = tx.execute(
            "
            UPDATE user_settings
            SET current_period_start = ?, updated_at = ?
            WHERE user_id = ? AND current_period_start = ?
            ",
            params![
                format_timestamp(next_start),
                format_timestamp(now),
                snapshot.user.as_str(),
                format_timestamp(expected_start),
            ],
        )?;
        if advanced == 0 {
            return Ok(false);
        }
        let inserted = tx.execute(
            &format!(
                "INSERT INTO period_snapshots ({SNAPSHOT_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                snapshot.user.as_str(),
                format_date(snapshot.start_date),
                format_date(snapshot.end_date),
                snapshot.total_work_seconds,
                snapshot.total_break_seconds,
                snapshot.average_productivity,
                snapshot.completed_tasks_count,
                snapshot.days_tracked,
                format_timestamp(snapshot.created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(DbError::SnapshotExists {
                    user: snapshot.user.to_string(),
                    start_date: format_date(snapshot.start_date),
                });
            }
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(true)
    }

    /// Lists the user's snapshots, oldest period first.
    pub fn period_snapshots(&self, user: &UserId) -> Result<Vec<PeriodSnapshot>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM period_snapshots WHERE user_id = ? ORDER BY start_date ASC"
        ))?;
        let rows = stmt.query_map([user.as_str()], snapshot_from_row)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.into_snapshot()?);
        }
        Ok(snapshots)
    }
}
