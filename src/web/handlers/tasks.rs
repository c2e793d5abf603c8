//! Task submission and status endpoints.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::models::{Task, TaskRequest};
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// POST /tasks - enqueue a task for its tenant. The response is the stored
/// task in QUEUED state; poll `GET /tasks/:id` for the result.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state.core.submit_task(request).await.map_err(ApiError::from)?;
    Ok(Json(task))
}

/// GET /tasks/:id - the full task record, including its result once a
/// terminal state is reached.
pub async fn get(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| ApiError::bad_request(format!("invalid task id '{task_id}'")))?;
    state
        .core
        .task(task_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))
}
