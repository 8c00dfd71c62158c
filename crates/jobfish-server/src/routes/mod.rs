//! HTTP routes.
//!
//! Every JSON response uses the [`ApiResponse`] envelope; orchestrator
//! errors map onto status codes in [`ApiError`].

pub mod applications;
pub mod health;
pub mod jobs;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobfish::OrchestratorError;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;

/// Response wrapper for API calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// An orchestrator error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::DuplicateInFlight { .. }
            | OrchestratorError::AlreadyFinalized { .. }
            | OrchestratorError::InvalidTransition { .. } => StatusCode::CONFLICT,
            OrchestratorError::AgentRejected(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::AgentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request refused");
        }

        let message = self.0.to_string();
        let body = match self.0 {
            OrchestratorError::DuplicateInFlight {
                application_id,
                status: app_status,
            } => ApiResponse {
                success: false,
                data: Some(json!({
                    "applicationId": application_id,
                    "status": app_status,
                })),
                error: Some(message),
            },
            _ => ApiResponse::err(message),
        };
        (status, Json(body)).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/search-jobs", post(jobs::search_jobs))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/autopilot", post(jobs::autopilot))
        .route("/api/searches", get(jobs::list_searches))
        .route("/api/apply", post(applications::apply))
        .route("/api/applications", get(applications::list_applications))
        .route("/api/applications/events", get(applications::events))
        .route("/api/applications/refresh", post(applications::refresh))
        .route("/api/applications/:id", get(applications::get_application))
        .route(
            "/api/applications/:id/finalize",
            post(applications::finalize),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
