//! CRUD operations for the `applications` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw application row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRow {
    pub id: String,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub board: String,
    pub apply_url: String,
    pub status: String,
    pub remote_id: Option<String>,
    pub streaming_url: Option<String>,
    pub result_url: Option<String>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    /// JSON-encoded agent result payload.
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl ApplicationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            job_title: row.get("job_title")?,
            company: row.get("company")?,
            board: row.get("board")?,
            apply_url: row.get("apply_url")?,
            status: row.get("status")?,
            remote_id: row.get("remote_id")?,
            streaming_url: row.get("streaming_url")?,
            result_url: row.get("result_url")?,
            failure_kind: row.get("failure_kind")?,
            failure_message: row.get("failure_message")?,
            result: row.get("result")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a new application row.
pub fn insert(db: &Database, app: &ApplicationRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO applications (id, job_id, job_title, company, board, apply_url, status,
             remote_id, streaming_url, result_url, failure_kind, failure_message, result,
             created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                app.id,
                app.job_id,
                app.job_title,
                app.company,
                app.board,
                app.apply_url,
                app.status,
                app.remote_id,
                app.streaming_url,
                app.result_url,
                app.failure_kind,
                app.failure_message,
                app.result,
                app.created_at,
                app.updated_at,
                app.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates the mutable columns of an existing row. Returns `false` when no
/// row with that id exists.
pub fn update(db: &Database, app: &ApplicationRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE applications SET status=?2, remote_id=?3, streaming_url=?4, result_url=?5,
             failure_kind=?6, failure_message=?7, result=?8, updated_at=?9, completed_at=?10
             WHERE id=?1",
            params![
                app.id,
                app.status,
                app.remote_id,
                app.streaming_url,
                app.result_url,
                app.failure_kind,
                app.failure_message,
                app.result,
                app.updated_at,
                app.completed_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Finds an application by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ApplicationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM applications WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ApplicationRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns every application, most recently created first. Ties on
/// `created_at` fall back to insertion order (newest first).
pub fn list_all(db: &Database) -> Result<Vec<ApplicationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM applications ORDER BY created_at DESC, rowid DESC")?;
        let rows = stmt
            .query_map([], ApplicationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
