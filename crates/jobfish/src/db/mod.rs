//! Persistent storage for the application ledger and search history.
//!
//! One SQLite file holds both tables. The ledger keeps its working set in
//! memory and writes through to `applications`; search history is only
//! ever read back on request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod application_repo;
pub mod error;
pub mod migrations;
pub mod search_repo;

pub use error::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the jobfish database.
///
/// Clones share one connection; callers take turns through
/// [`Database::with_conn`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Option<Arc<PathBuf>>,
}

impl Database {
    /// Opens (or creates) the database file, creating its parent directory
    /// if needed, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn, Some(path.to_path_buf()))?;

        log::info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Opens a private in-memory database; everything is lost on drop.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(conn: Connection, location: Option<PathBuf>) -> Result<Self, DatabaseError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.map(Arc::new),
        })
    }

    /// The database file, or `None` for an in-memory database.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref().map(PathBuf::as_path)
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Default database location: `~/.jobfish/data/jobfish.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".jobfish").join("data").join("jobfish.db"))
}
