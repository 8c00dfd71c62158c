//! Search history rows in the `job_searches` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw search history row.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRow {
    pub id: String,
    pub query: String,
    pub location: String,
    /// Comma-separated board names, in request order.
    pub boards: String,
    pub streaming_url: Option<String>,
    pub result_count: u32,
    /// JSON array of the jobs returned by the search.
    pub results: String,
    pub created_at: String,
}

impl SearchRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            query: row.get("query")?,
            location: row.get("location")?,
            boards: row.get("boards")?,
            streaming_url: row.get("streaming_url")?,
            result_count: row.get("result_count")?,
            results: row.get("results")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a search history row.
pub fn insert(db: &Database, search: &SearchRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_searches (id, query, location, boards, streaming_url, result_count,
             results, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                search.id,
                search.query,
                search.location,
                search.boards,
                search.streaming_url,
                search.result_count,
                search.results,
                search.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Returns the most recent searches, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<SearchRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job_searches ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], SearchRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
