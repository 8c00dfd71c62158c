//! Search, job listing and autopilot handlers.

use axum::extract::{Query, State};
use axum::Json;
use jobfish::{ApplicantProfile, AutopilotReport, Job, SearchQuery, SearchRecord};
use serde::{Deserialize, Serialize};

use super::{ok, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobsResponse {
    pub search_id: String,
    pub jobs: Vec<Job>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    pub superseded: bool,
}

pub async fn search_jobs(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<SearchJobsResponse> {
    let outcome = state.orchestrator.search(query).await?;
    ok(SearchJobsResponse {
        search_id: outcome.search_id,
        count: outcome.jobs.len(),
        jobs: outcome.jobs,
        streaming_url: outcome.streaming_url,
        superseded: outcome.superseded,
    })
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Vec<Job>> {
    ok(state.orchestrator.list_jobs())
}

fn default_max_applications() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotRequest {
    #[serde(flatten)]
    pub query: SearchQuery,
    pub applicant: ApplicantProfile,
    #[serde(default = "default_max_applications")]
    pub max_applications: usize,
}

pub async fn autopilot(
    State(state): State<AppState>,
    Json(request): Json<AutopilotRequest>,
) -> ApiResult<AutopilotReport> {
    let report = state
        .orchestrator
        .autopilot(request.query, &request.applicant, request.max_applications)
        .await?;
    ok(report)
}

#[derive(Debug, Deserialize)]
pub struct SearchesParams {
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    20
}

pub async fn list_searches(
    State(state): State<AppState>,
    Query(params): Query<SearchesParams>,
) -> ApiResult<Vec<SearchRecord>> {
    ok(state.orchestrator.list_searches(params.limit.min(100))?)
}
