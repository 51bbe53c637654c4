//! Timer rows.

use chrono::{DateTime, Utc};
use pt_core::{PauseInterval, Timer, TimerId, TimerStatus, Transition, UserId};
use rusqlite::{OptionalExtension, Row, params};

use crate::{
    Database, DbError, format_timestamp, invalid_data, is_unique_violation, parse_timestamp,
};

const TIMER_COLUMNS: &str = "id, user_id, start_time, end_time, duration_seconds, status, pauses, description, tags, created_at, updated_at, version";

/// A timer row as stored, before decoding.
struct TimerRow {
    id: String,
    user_id: String,
    start_time: String,
    end_time: Option<String>,
    duration_seconds: Option<i64>,
    status: String,
    pauses: String,
    description: Option<String>,
    tags: String,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl TimerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            duration_seconds: row.get(4)?,
            status: row.get(5)?,
            pauses: row.get(6)?,
            description: row.get(7)?,
            tags: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            version: row.get(11)?,
        })
    }

    fn into_timer(self) -> Result<Timer, DbError> {
        let context = format!("timer {}", self.id);
        let pauses: Vec<PauseInterval> =
            serde_json::from_str(&self.pauses).map_err(|e| invalid_data(&context, e))?;
        let tags: Vec<String> =
            serde_json::from_str(&self.tags).map_err(|e| invalid_data(&context, e))?;
        Ok(Timer {
            id: TimerId::new(self.id.clone()).map_err(|e| invalid_data(&context, e))?,
            user: UserId::new(self.user_id).map_err(|e| invalid_data(&context, e))?,
            start_time: parse_timestamp(&self.start_time, &context)?,
            end_time: self
                .end_time
                .as_deref()
                .map(|t| parse_timestamp(t, &context))
                .transpose()?,
            duration_seconds: self.duration_seconds,
            status: self
                .status
                .parse::<TimerStatus>()
                .map_err(|e| invalid_data(&context, e))?,
            pauses,
            description: self.description,
            tags,
            created_at: parse_timestamp(&self.created_at, &context)?,
            updated_at: parse_timestamp(&self.updated_at, &context)?,
            version: self.version,
        })
    }
}

fn encode_json<T: serde::Serialize>(value: &T, context: &str) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|e| invalid_data(context, e))
}

impl Database {
    /// Inserts a newly started timer.
    ///
    /// Fails with [`DbError::LiveTimerExists`] if the user already has a
    /// running or paused timer.
    pub fn insert_timer(&self, timer: &Timer) -> Result<(), DbError> {
        let context = format!("timer {}", timer.id);
        let result = self.conn.execute(
            "
            INSERT INTO timers
            (id, user_id, start_time, end_time, duration_seconds, status, pauses, description, tags, created_at, updated_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                timer.id.as_str(),
                timer.user.as_str(),
                format_timestamp(timer.start_time),
                timer.end_time.map(format_timestamp),
                timer.duration_seconds,
                timer.status.as_str(),
                encode_json(&timer.pauses, &context)?,
                timer.description,
                encode_json(&timer.tags, &context)?,
                format_timestamp(timer.created_at),
                format_timestamp(timer.updated_at),
                timer.version,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(DbError::LiveTimerExists {
                user: timer.user.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Persists a move, conditioned on the row still holding the status and
    /// version the move was computed from.
    ///
    /// Fails with [`DbError::StaleTimer`] if another writer got there first.
    pub fn update_timer(&self, transition: &Transition) -> Result<(), DbError> {
        let timer = &transition.timer;
        let context = format!("timer {}", timer.id);
        let expected_version = timer.version - 1;
        let updated = self.conn.execute(
            "
            UPDATE timers
            SET end_time = ?, duration_seconds = ?, status = ?, pauses = ?, updated_at = ?, version = ?
            WHERE id = ? AND status = ? AND version = ?
            ",
            params![
                timer.end_time.map(format_timestamp),
                timer.duration_seconds,
                timer.status.as_str(),
                encode_json(&timer.pauses, &context)?,
                format_timestamp(timer.updated_at),
                timer.version,
                timer.id.as_str(),
                transition.previous_status.as_str(),
                expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::StaleTimer {
                id: timer.id.to_string(),
                expected_status: transition.previous_status.to_string(),
                expected_version,
            });
        }
        Ok(())
    }

    /// Returns the user's running or paused timer, if any.
    pub fn live_timer(&self, user: &UserId) -> Result<Option<Timer>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TIMER_COLUMNS} FROM timers WHERE user_id = ? AND status IN ('running', 'paused')"
                ),
                [user.as_str()],
                TimerRow::from_row,
            )
            .optional()?;
        row.map(TimerRow::into_timer).transpose()
    }

    /// Looks up a timer by ID.
    pub fn get_timer(&self, id: &TimerId) -> Result<Option<Timer>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TIMER_COLUMNS} FROM timers WHERE id = ?"),
                [id.as_str()],
                TimerRow::from_row,
            )
            .optional()?;
        row.map(TimerRow::into_timer).transpose()
    }

    /// Lists the user's timers updated strictly after `since`, oldest change first.
    pub fn timers_updated_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Timer>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TIMER_COLUMNS}
            FROM timers
            WHERE user_id = ? AND updated_at > ?
            ORDER BY updated_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![user.as_str(), format_timestamp(since)],
            TimerRow::from_row,
        )?;
        let mut timers = Vec::new();
        for row in rows {
            timers.push(row?.into_timer()?);
        }
        Ok(timers)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pt_core::TimerAction;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn start(db: &Database, who: &str, at: DateTime<Utc>) -> Timer {
        let timer = Timer::start(user(who), Some("write".into()), vec!["deep".into()], at);
        db.insert_timer(&timer).expect("insert timer");
        timer
    }

    #[test]
    fn inserted_timer_round_trips() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let timer = start(&db, "u1", t0());

        let live = db.live_timer(&user("u1")).unwrap().expect("live timer");
        assert_eq!(live, timer);
        assert_eq!(db.get_timer(&timer.id).unwrap(), Some(timer));
        assert!(db.live_timer(&user("u2")).unwrap().is_none());
    }

    #[test]
    fn second_live_timer_is_rejected() {
        let db = Database::open_in_memory().expect("open in-memory db");
        start(&db, "u1", t0());

        let second = Timer::start(user("u1"), None, vec![], t0() + Duration::seconds(1));
        let err = db.insert_timer(&second).unwrap_err();
        assert!(matches!(err, DbError::LiveTimerExists { .. }));
        assert!(err.is_conflict());

        // other users are unaffected
        start(&db, "u2", t0());
    }

    #[test]
    fn completed_timer_frees_the_live_slot() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let timer = start(&db, "u1", t0());
        let stopped = timer
            .apply(TimerAction::Stop, t0() + Duration::seconds(60))
            .unwrap();
        db.update_timer(&stopped).expect("update timer");

        assert!(db.live_timer(&user("u1")).unwrap().is_none());
        start(&db, "u1", t0() + Duration::seconds(61));
    }

    #[test]
    fn stale_update_is_rejected() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let timer = start(&db, "u1", t0());

        // two racing moves computed from the same read
        let paused = timer
            .apply(TimerAction::Pause, t0() + Duration::seconds(5))
            .unwrap();
        let stopped = timer
            .apply(TimerAction::Stop, t0() + Duration::seconds(6))
            .unwrap();

        db.update_timer(&paused).expect("first move wins");
        let err = db.update_timer(&stopped).unwrap_err();
        assert!(matches!(err, DbError::StaleTimer { .. }));

        let stored = db.get_timer(&timer.id).unwrap().unwrap();
        assert_eq!(stored.status, TimerStatus::Paused);
        assert_eq!(stored.pauses.len(), 1);
        assert!(stored.pauses_consistent());
    }

    #[test]
    fn sync_delta_returns_rows_changed_after_cursor() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let first = start(&db, "u1", t0());
        let stopped = first
            .apply(TimerAction::Stop, t0() + Duration::minutes(10))
            .unwrap();
        db.update_timer(&stopped).unwrap();
        let second = start(&db, "u1", t0() + Duration::minutes(20));
        start(&db, "u2", t0() + Duration::minutes(30));

        let all = db.timers_updated_since(&user("u1"), t0() - Duration::days(1)).unwrap();
        assert_eq!(all.len(), 2);

        let delta = db
            .timers_updated_since(&user("u1"), t0() + Duration::minutes(10))
            .unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].id, second.id);
    }
}
