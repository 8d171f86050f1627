// Workflow HTTP routes: run, status, revoke

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use drover_core::{TaskRecord, Workflow, WorkflowRecord};
use drover_storage::Database;
use drover_worker::{set_workflow_run_state, ScheduleError, Scheduler};

/// App state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub scheduler: Arc<Scheduler>,
}

/// Response of a successful submission
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionId {
    pub id: String,
}

/// Query parameters naming a workflow
#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowIdParams {
    pub id: String,
}

/// Create workflow routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v2/workflow/run", post(run_workflow))
        .route("/api/v2/workflow/status", get(workflow_status))
        .route("/api/v2/workflow/revoke", post(revoke_workflow))
        .with_state(state)
}

/// POST /api/v2/workflow/run - Execute a collection of tasks
#[utoipa::path(
    post,
    path = "/api/v2/workflow/run",
    request_body = Workflow,
    responses(
        (status = 200, description = "Workflow accepted", body = ExecutionId),
        (status = 400, description = "Invalid workflow"),
        (status = 500, description = "Persistence or broker error")
    ),
    tag = "workflow"
)]
pub async fn run_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<Json<ExecutionId>, (StatusCode, String)> {
    let id = state.scheduler.run(workflow).await.map_err(|e| match e {
        ScheduleError::Invalid(invalid) => {
            tracing::warn!(error = %invalid, "Rejected workflow submission");
            (StatusCode::BAD_REQUEST, invalid.to_string())
        }
        ScheduleError::Internal(error) => {
            tracing::error!(error = %error, "Error executing workflow");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error executing workflow".to_string(),
            )
        }
    })?;

    Ok(Json(ExecutionId { id }))
}

/// GET /api/v2/workflow/status - Execution status by workflow id
#[utoipa::path(
    get,
    path = "/api/v2/workflow/status",
    params(("id" = String, Query, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow with task children", body = WorkflowRecord),
        (status = 404, description = "Unknown workflow"),
        (status = 500, description = "Persistence error")
    ),
    tag = "workflow"
)]
pub async fn workflow_status(
    State(state): State<AppState>,
    Query(params): Query<WorkflowIdParams>,
) -> Result<Json<WorkflowRecord>, (StatusCode, String)> {
    let record = load_record(&state.db, &params.id).await?;
    Ok(Json(record))
}

/// POST /api/v2/workflow/revoke - Cancel pending execution
///
/// In-flight tasks are not interrupted; still-queued tasks of a revoked
/// workflow are dropped by the worker when consumed.
#[utoipa::path(
    post,
    path = "/api/v2/workflow/revoke",
    params(("id" = String, Query, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow revoked", body = WorkflowRecord),
        (status = 404, description = "Unknown workflow"),
        (status = 500, description = "Persistence error")
    ),
    tag = "workflow"
)]
pub async fn revoke_workflow(
    State(state): State<AppState>,
    Query(params): Query<WorkflowIdParams>,
) -> Result<Json<WorkflowRecord>, (StatusCode, String)> {
    let revoked = state.db.revoke_workflow(&params.id).await.map_err(|e| {
        tracing::error!(error = %e, id = %params.id, "Error revoking workflow");
        (StatusCode::INTERNAL_SERVER_ERROR, "Error revoking workflow".to_string())
    })?;
    if revoked.is_none() {
        return Err((StatusCode::NOT_FOUND, format!("Workflow {} not found", params.id)));
    }

    // Make the stored status reflect the flag immediately.
    set_workflow_run_state(&state.db, &params.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, id = %params.id, "Error recomputing workflow status");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error revoking workflow".to_string())
        })?;

    let record = load_record(&state.db, &params.id).await?;
    Ok(Json(record))
}

/// Load a workflow record with its task children joined in.
async fn load_record(
    db: &Database,
    id: &str,
) -> Result<WorkflowRecord, (StatusCode, String)> {
    let internal = |e: anyhow::Error| {
        tracing::error!(error = %e, id = %id, "Error reading workflow");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error getting workflow {id}"),
        )
    };

    let Some(row) = db.get_workflow(id).await.map_err(internal)? else {
        return Err((StatusCode::NOT_FOUND, format!("Workflow {id} not found")));
    };

    let tasks: Vec<TaskRecord> = db
        .find_tasks(id)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|row| row.into_record())
        .collect::<anyhow::Result<_>>()
        .map_err(internal)?;

    row.into_record(tasks).map_err(internal)
}
