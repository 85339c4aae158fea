//! HTTP handlers for the Runner's four endpoints.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Serialize;

use crate::runner::capability;
use crate::runner::error::RunnerError;
use crate::runner::model::RunRequest;
use crate::runner::model::RunResponse;
use crate::server::state::AppState;

/// `GET /health` body. Never fails; does not invoke Preflight.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
}

/// `GET /health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `GET /capabilities` body.
#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    /// Overall status string.
    pub status: &'static str,
    /// Container runtime connectivity details.
    pub docker: DockerInfo,
    /// Endpoints exposed by this process.
    pub endpoints: Vec<&'static str>,
    /// Free-form operational notes.
    pub notes: Vec<String>,
}

/// Container runtime details reported by `/capabilities`.
#[derive(Debug, Serialize)]
pub struct DockerInfo {
    /// Whether the runtime responded to a version query.
    pub reachable: bool,
    /// Raw version string, when reachable.
    pub version: Option<String>,
}

/// `GET /capabilities`.
pub async fn capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    let version = state.runtime.version().await.ok();
    let reachable = version.is_some();

    Json(CapabilitiesResponse {
        status: if reachable { "ok" } else { "degraded" },
        docker: DockerInfo { reachable, version },
        endpoints: vec!["/health", "/capabilities", "/sandboxes/health", "/run"],
        notes: if reachable {
            vec![]
        } else {
            vec!["container runtime did not respond to a version query".to_string()]
        },
    })
}

/// `GET /sandboxes/health`.
pub async fn sandboxes_health(State(state): State<AppState>) -> Json<capability::CapabilityReport> {
    let report = capability::probe(state.runtime.as_ref(), &state.known_sandboxes).await;
    Json(report)
}

/// `POST /run`.
pub async fn run(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, RunnerError> {
    let Json(request) = payload.map_err(|rejection| RunnerError::Validation(rejection.to_string()))?;
    request.validate().map_err(RunnerError::Validation)?;

    let _permit = match &state.job_slots {
        Some(semaphore) => Some(
            semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("job semaphore should never be closed"),
        ),
        None => None,
    };

    let response = state.job_runner.run(request).await?;
    Ok(Json(response))
}
