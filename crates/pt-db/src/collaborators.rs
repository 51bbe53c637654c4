//! Minimal rows owned by collaborators: the user directory, tasks and
//! financial transactions. The pipeline only needs enough of them to
//! enumerate users, derive completion edges and prune old data.

use chrono::{DateTime, NaiveDate, Utc};
use pt_core::{TaskId, TaskStatus, UserId};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::{Database, DbError, format_date, format_timestamp, invalid_data};

impl Database {
    /// Records a user. Returns `true` if they were not known before.
    pub fn register_user(&self, user: &UserId, now: DateTime<Utc>) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)",
            params![user.as_str(), format_timestamp(now)],
        )?;
        Ok(inserted > 0)
    }

    /// Lists every known user, ordered by ID.
    pub fn list_users(&self) -> Result<Vec<UserId>, DbError> {
        let mut stmt = self.conn.prepare("SELECT id FROM users ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut users = Vec::new();
        for row in rows {
            let id = row?;
            let user = UserId::new(id.clone()).map_err(|e| invalid_data(&format!("user {id}"), e))?;
            users.push(user);
        }
        Ok(users)
    }

    /// Returns a task's current status, if the task exists.
    pub fn task_status(&self, task: &TaskId) -> Result<Option<TaskStatus>, DbError> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM tasks WHERE id = ?",
                [task.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        status
            .map(|s| {
                s.parse::<TaskStatus>()
                    .map_err(|e| invalid_data(&format!("task {task}"), e))
            })
            .transpose()
    }

    /// Creates or updates a task and returns the status it had before.
    ///
    /// Read and write share one immediate transaction, so two concurrent saves
    /// observe each other's status and at most one of them sees the edge into
    /// `done`. A `None` title keeps the stored one.
    pub fn save_task(
        &mut self,
        user: &UserId,
        task: &TaskId,
        title: Option<&str>,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskStatus>, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT user_id, status FROM tasks WHERE id = ?",
                [task.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let previous = match existing {
            Some((owner, _)) if owner != user.as_str() => {
                return Err(DbError::TaskOwnership {
                    task: task.to_string(),
                });
            }
            Some((_, previous)) => Some(
                previous
                    .parse::<TaskStatus>()
                    .map_err(|e| invalid_data(&format!("task {task}"), e))?,
            ),
            None => None,
        };

        let now = format_timestamp(now);
        tx.execute(
            "
            INSERT INTO tasks (id, user_id, title, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = COALESCE(excluded.title, title),
                status = excluded.status,
                updated_at = excluded.updated_at
            ",
            params![task.as_str(), user.as_str(), title, status.as_str(), now],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Records a financial transaction.
    pub fn insert_transaction(
        &self,
        id: &str,
        user: &UserId,
        amount_cents: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO transactions (id, user_id, amount_cents, date, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                id,
                user.as_str(),
                amount_cents,
                format_date(date),
                format_timestamp(now)
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn register_user_is_idempotent() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let bob = UserId::new("bob").unwrap();
        let alice = UserId::new("alice").unwrap();

        assert!(db.register_user(&bob, now()).unwrap());
        assert!(!db.register_user(&bob, now()).unwrap());
        assert!(db.register_user(&alice, now()).unwrap());

        assert_eq!(db.list_users().unwrap(), vec![alice, bob]);
    }

    #[test]
    fn save_task_reports_previous_status() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let user = UserId::new("u1").unwrap();
        let task = TaskId::new("t1").unwrap();

        let first = db
            .save_task(&user, &task, Some("write report"), TaskStatus::Todo, now())
            .unwrap();
        assert_eq!(first, None);

        let second = db
            .save_task(&user, &task, None, TaskStatus::Done, now())
            .unwrap();
        assert_eq!(second, Some(TaskStatus::Todo));

        let third = db
            .save_task(&user, &task, None, TaskStatus::Done, now())
            .unwrap();
        assert_eq!(third, Some(TaskStatus::Done));

        let title: Option<String> = db
            .conn
            .query_row("SELECT title FROM tasks WHERE id = 't1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(title.as_deref(), Some("write report"));
    }

    #[test]
    fn tasks_cannot_be_saved_by_another_user() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let task = TaskId::new("t1").unwrap();
        db.save_task(&UserId::new("u1").unwrap(), &task, None, TaskStatus::Todo, now())
            .unwrap();

        let err = db
            .save_task(&UserId::new("u2").unwrap(), &task, None, TaskStatus::Done, now())
            .unwrap_err();
        assert!(matches!(err, DbError::TaskOwnership { .. }));
        assert_eq!(db.task_status(&task).unwrap(), Some(TaskStatus::Todo));
    }
}
