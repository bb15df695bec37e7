//! Deployment task endpoints.
//!
//! Submitting a task returns as soon as the record is persisted; dispatch and
//! probing continue in the background and are observed by polling
//! `GET /v1/tasks/{id}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use deckhand_core::store::TaskStore;
use tracing::info;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::middleware::tenant::Caller;
use crate::schemas::v1::task::{
    SubmitTaskRequest, SubmitTaskResponse, TaskDetailResponse, TaskResponse, WorkloadResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(submit_task, list_tasks, get_task, delete_task),
    components(schemas(
        SubmitTaskRequest,
        SubmitTaskResponse,
        TaskResponse,
        WorkloadResponse,
        TaskDetailResponse
    ))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(submit_task))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
}

#[utoipa::path(
    post,
    path = "/v1/tasks",
    tag = "tasks",
    request_body = SubmitTaskRequest,
    responses(
        (status = 202, description = "Task accepted", body = SubmitTaskResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Application not registered"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ServerError> {
    req.validate().map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let id = state.orchestrator.submit(req.into_submit(caller.tenant)).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { id })))
}

#[utoipa::path(
    get,
    path = "/v1/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "Tasks visible to the caller, newest first",
         body = [TaskResponse]),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<TaskResponse>>, ServerError> {
    let records = state.store.list_tasks(caller.visibility()).await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task with its workloads", body = TaskDetailResponse),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<TaskDetailResponse>, ServerError> {
    let task = state
        .store
        .get_task(&id, caller.visibility())
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("task {id} not found")))?;
    let workloads = state.store.list_workloads(&id).await?;

    Ok(Json(TaskDetailResponse {
        task: task.into(),
        workloads: workloads.into_iter().map(WorkloadResponse::from).collect(),
    }))
}

/// Delete a task's history. Tasks that are still running cannot be deleted.
#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 400, description = "Task still in progress"),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    let task = state
        .store
        .get_task(&id, caller.visibility())
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("task {id} not found")))?;
    if !task.status.is_terminal() {
        return Err(ServerError::BadRequest(format!("task {id} is still {}", task.status)));
    }
    if !state.store.delete_task_history(&id).await? {
        return Err(ServerError::NotFound(format!("task {id} not found")));
    }
    info!(task_id = %id, tenant = %caller.tenant, "task history deleted");
    Ok(StatusCode::NO_CONTENT)
}
