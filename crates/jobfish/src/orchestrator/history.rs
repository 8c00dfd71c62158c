//! Search history records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::search_repo::SearchRow;
use crate::db::DatabaseError;
use crate::jobs::{Job, JobBoard};

/// One completed search, as kept in the history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub id: String,
    pub query: String,
    pub location: String,
    pub boards: Vec<JobBoard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    pub result_count: u32,
    pub jobs: Vec<Job>,
    pub created_at: DateTime<Utc>,
}

impl SearchRecord {
    pub(crate) fn to_row(&self) -> Result<SearchRow, DatabaseError> {
        let results =
            serde_json::to_string(&self.jobs).map_err(|e| DatabaseError::Serialization {
                column: "results",
                source: e,
            })?;
        Ok(SearchRow {
            id: self.id.clone(),
            query: self.query.clone(),
            location: self.location.clone(),
            boards: self
                .boards
                .iter()
                .map(JobBoard::as_str)
                .collect::<Vec<_>>()
                .join(","),
            streaming_url: self.streaming_url.clone(),
            result_count: self.result_count,
            results,
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }

    pub(crate) fn from_row(row: SearchRow) -> Self {
        let boards = row
            .boards
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<JobBoard>() {
                Ok(board) => Some(board),
                Err(e) => {
                    log::warn!("{} in search {}", e, row.id);
                    None
                }
            })
            .collect();
        let jobs = serde_json::from_str(&row.results).unwrap_or_else(|e| {
            log::warn!("Unreadable results for search {}: {}", row.id, e);
            Vec::new()
        });
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Self {
            id: row.id,
            query: row.query,
            location: row.location,
            boards,
            streaming_url: row.streaming_url,
            result_count: row.result_count,
            jobs,
            created_at,
        }
    }
}
