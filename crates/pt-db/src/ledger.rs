//! Daily summary rows and the contribution log.

use chrono::{DateTime, NaiveDate, Utc};
use pt_core::{Contribution, ContributionKind, DailySummary, UserId, productivity_score};
use rusqlite::{OptionalExtension, Row, params};

use crate::{
    Database, DbError, format_date, format_timestamp, invalid_data, parse_date, parse_timestamp,
};

struct SummaryRow {
    user_id: String,
    date: String,
    total_work_seconds: i64,
    total_break_seconds: i64,
    completed_tasks_count: i64,
    productivity_score: i64,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            date: row.get(1)?,
            total_work_seconds: row.get(2)?,
            total_break_seconds: row.get(3)?,
            completed_tasks_count: row.get(4)?,
            productivity_score: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_summary(self) -> Result<DailySummary, DbError> {
        let context = format!("daily summary {}/{}", self.user_id, self.date);
        Ok(DailySummary {
            user: UserId::new(self.user_id).map_err(|e| invalid_data(&context, e))?,
            date: parse_date(&self.date, &context)?,
            total_work_seconds: self.total_work_seconds,
            total_break_seconds: self.total_break_seconds,
            completed_tasks_count: self.completed_tasks_count,
            productivity_score: u8::try_from(self.productivity_score)
                .map_err(|e| invalid_data(&context, e))?,
            updated_at: Some(parse_timestamp(&self.updated_at, &context)?),
        })
    }
}

const SUMMARY_COLUMNS: &str = "user_id, date, total_work_seconds, total_break_seconds, completed_tasks_count, productivity_score, updated_at";

impl Database {
    /// Applies one contribution to the `(user, date)` summary row.
    ///
    /// The row is created on first contribution. The counter change and the
    /// record of `contribution.key` commit together, so a key that was already
    /// applied changes nothing and returns `false`. Break contributions of zero
    /// or fewer seconds are ignored.
    ///
    /// The score is not touched; follow with [`Database::recompute_score`].
    pub fn apply_contribution(
        &mut self,
        user: &UserId,
        date: NaiveDate,
        contribution: &Contribution,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        if !contribution.is_effective() {
            return Ok(false);
        }
        let (work, brk, tasks) = match contribution.kind {
            ContributionKind::Work { seconds } => (seconds.max(0), 0, 0),
            ContributionKind::Break { seconds } => (0, seconds, 0),
            ContributionKind::CompletedTask => (0, 0, 1),
        };
        let date = format_date(date);
        let now = format_timestamp(now);

        let tx = self.conn.transaction()?;
        let fresh = tx.execute(
            "INSERT OR IGNORE INTO ledger_events (key, user_id, date, applied_at)
             VALUES (?, ?, ?, ?)",
            params![contribution.key, user.as_str(), date, now],
        )?;
        if fresh == 0 {
            tracing::debug!(key = %contribution.key, "contribution already applied");
            return Ok(false);
        }
        tx.execute(
            "
            INSERT INTO daily_summaries
            (user_id, date, total_work_seconds, total_break_seconds, completed_tasks_count, productivity_score, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            ON CONFLICT(user_id, date) DO UPDATE SET
                total_work_seconds = total_work_seconds + excluded.total_work_seconds,
                total_break_seconds = total_break_seconds + excluded.total_break_seconds,
                completed_tasks_count = completed_tasks_count + excluded.completed_tasks_count,
                updated_at = excluded.updated_at
            ",
            params![user.as_str(), date, work, brk, tasks, now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Rewrites the score of the `(user, date)` row from its current counters.
    ///
    /// Returns the new score, or `None` if the row does not exist.
    pub fn recompute_score(&self, user: &UserId, date: NaiveDate) -> Result<Option<u8>, DbError> {
        let date = format_date(date);
        let counters: Option<(i64, i64, i64)> = self
            .conn
            .query_row(
                "
                SELECT total_work_seconds, total_break_seconds, completed_tasks_count
                FROM daily_summaries
                WHERE user_id = ? AND date = ?
                ",
                params![user.as_str(), date],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((work, brk, tasks)) = counters else {
            return Ok(None);
        };
        let score = productivity_score(work, brk, tasks);
        self.conn.execute(
            "UPDATE daily_summaries SET productivity_score = ? WHERE user_id = ? AND date = ?",
            params![score, user.as_str(), date],
        )?;
        Ok(Some(score))
    }

    /// Returns the summary row for `(user, date)`, if anything has been contributed.
    pub fn daily_summary(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM daily_summaries WHERE user_id = ? AND date = ?"
                ),
                params![user.as_str(), format_date(date)],
                SummaryRow::from_row,
            )
            .optional()?;
        row.map(SummaryRow::into_summary).transpose()
    }

    /// Lists the user's summaries dated in `[start, end)`, oldest first.
    pub fn summaries_between(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SUMMARY_COLUMNS}
            FROM daily_summaries
            WHERE user_id = ? AND date >= ? AND date < ?
            ORDER BY date ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![user.as_str(), format_date(start), format_date(end)],
            SummaryRow::from_row,
        )?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_summary()?);
        }
        Ok(summaries)
    }
}
