//! Apply, application history and finalization handlers.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use jobfish::broadcast::ApplicationEventKind;
use jobfish::{ApplicantProfile, Application, Finalization};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::{ok, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub job_id: String,
    pub applicant: ApplicantProfile,
}

pub async fn apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Application>>), ApiError> {
    let application = state
        .orchestrator
        .apply(&request.job_id, &request.applicant)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(application))))
}

pub async fn list_applications(State(state): State<AppState>) -> ApiResult<Vec<Application>> {
    ok(state.orchestrator.list_applications())
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Application> {
    ok(state.orchestrator.get_application(&id)?)
}

pub async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(finalization): Json<Finalization>,
) -> ApiResult<Application> {
    ok(state.orchestrator.finalize(&id, finalization)?)
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub triggered: bool,
}

/// Asks the status poller for an immediate pass.
pub async fn refresh(State(state): State<AppState>) -> ApiResult<RefreshResponse> {
    let triggered = state.poll_trigger.send(()).is_ok();
    if !triggered {
        tracing::debug!("Status refresh requested but no poller is running");
    }
    ok(RefreshResponse { triggered })
}

/// Streams application lifecycle events as server-sent events.
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    Sse::new(event_stream(&state)).keep_alive(KeepAlive::default())
}

fn event_stream(state: &AppState) -> impl Stream<Item = Result<Event, Infallible>> {
    let rx = state.orchestrator.events().subscribe();

    BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let name = match event.kind {
                ApplicationEventKind::Created => "created",
                ApplicationEventKind::StatusChanged => "status_changed",
            };
            match Event::default().event(name).json_data(&event) {
                Ok(sse) => Some(Ok::<_, Infallible>(sse)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode application event");
                    None
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "Event subscriber lagged");
            Some(Ok(Event::default()
                .event("lagged")
                .data(format!("{{\"skipped\":{}}}", skipped))))
        }
    })
}
