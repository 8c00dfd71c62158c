use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Job boards the agent knows how to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobBoard {
    Greenhouse,
    Lever,
    Indeed,
    Linkedin,
    Workday,
}

impl JobBoard {
    pub const ALL: [JobBoard; 5] = [
        JobBoard::Greenhouse,
        JobBoard::Lever,
        JobBoard::Indeed,
        JobBoard::Linkedin,
        JobBoard::Workday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobBoard::Greenhouse => "greenhouse",
            JobBoard::Lever => "lever",
            JobBoard::Indeed => "indeed",
            JobBoard::Linkedin => "linkedin",
            JobBoard::Workday => "workday",
        }
    }

    /// Landing page the agent starts a search session from.
    pub fn search_url(&self) -> &'static str {
        match self {
            JobBoard::Greenhouse => "https://boards.greenhouse.io",
            JobBoard::Lever => "https://jobs.lever.co",
            JobBoard::Indeed => "https://www.indeed.com/jobs",
            JobBoard::Linkedin => "https://www.linkedin.com/jobs/search",
            JobBoard::Workday => "https://www.myworkdayjobs.com",
        }
    }
}

impl fmt::Display for JobBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job board: {0}")]
pub struct UnknownBoard(pub String);

impl FromStr for JobBoard {
    type Err = UnknownBoard;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        JobBoard::ALL
            .into_iter()
            .find(|b| b.as_str() == normalized)
            .ok_or_else(|| UnknownBoard(s.to_string()))
    }
}

/// A job posting discovered by a search.
///
/// Immutable once stored; the store replaces whole snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub board: JobBoard,
    pub apply_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<String>,
}

impl Job {
    /// Derives an identifier from the board and application URL, so the
    /// same posting keeps its id across searches.
    pub fn stable_id(board: JobBoard, apply_url: &str) -> String {
        // FNV-1a; stable across builds, unlike `DefaultHasher`.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in board
            .as_str()
            .bytes()
            .chain(std::iter::once(b'|'))
            .chain(apply_url.trim().bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        format!("{}-{:016x}", board.as_str(), hash)
    }
}
