//! Builders for test data.

#![allow(dead_code)]

use std::time::Duration;

use jobfish::{ApplicantProfile, Job, JobBoard, OrchestratorSettings};

/// A Lever posting whose id is derived from `slug`.
pub fn job(slug: &str) -> Job {
    JobBuilder::new(slug).build()
}

/// `count` distinct postings, `job-1` to `job-count`.
pub fn jobs(count: usize) -> Vec<Job> {
    (1..=count).map(|i| job(&format!("job-{}", i))).collect()
}

/// Builder for `Job` instances.
pub struct JobBuilder {
    slug: String,
    title: String,
    company: String,
    board: JobBoard,
}

impl JobBuilder {
    pub fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            title: format!("Engineer ({})", slug),
            company: "Acme".to_string(),
            board: JobBoard::Lever,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn company(mut self, company: &str) -> Self {
        self.company = company.to_string();
        self
    }

    pub fn board(mut self, board: JobBoard) -> Self {
        self.board = board;
        self
    }

    pub fn build(self) -> Job {
        let apply_url = format!("{}/acme/{}", self.board.search_url(), self.slug);
        Job {
            id: Job::stable_id(self.board, &apply_url),
            title: self.title,
            company: self.company,
            location: "Remote".to_string(),
            board: self.board,
            apply_url,
            description: None,
            posted_date: None,
        }
    }
}

pub fn applicant() -> ApplicantProfile {
    ApplicantProfile {
        full_name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "555-0100".to_string(),
        location: "London".to_string(),
        linkedin_url: None,
        github_url: None,
        years_experience: 8,
        skills: vec!["Rust".to_string(), "SQL".to_string()],
        summary: "Analytical engine enthusiast".to_string(),
        education: "Private tutoring".to_string(),
        most_recent_role: "Analyst".to_string(),
        most_recent_company: "Babbage & Co".to_string(),
    }
}

/// Settings with short deadlines and no autopilot pause.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_concurrent_applies: 4,
        search_timeout: Duration::from_secs(5),
        apply_ack_timeout: Duration::from_secs(5),
        autopilot_pause: Duration::ZERO,
    }
}
