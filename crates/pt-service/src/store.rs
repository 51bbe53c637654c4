//! Per-operation database access on the blocking pool.

use std::path::{Path, PathBuf};

use pt_db::{Database, DbError};

use crate::error::TrackerError;

/// Location of the SQLite database shared by every request.
///
/// Each operation opens its own connection, so no handle is shared between
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a connection synchronously.
    pub fn open(&self) -> Result<Database, DbError> {
        Database::open(&self.path)
    }

    /// Runs `f` against a fresh connection on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&mut Database) -> Result<T, TrackerError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = store.open()?;
            f(&mut db)
        })
        .await?
    }
}
