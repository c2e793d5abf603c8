//! Tenant CRUD endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::core::TenantStatus;
use crate::models::TenantSpec;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Tenant as reported by the API: the stored record joined with live
/// capacity and queue counters.
#[derive(Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub workers: u32,
    pub worker_count: u32,
    pub idle_workers: u32,
    pub running_workers: u32,
    pub queued_tasks: usize,
    pub in_flight_tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_clusters: Option<u32>,
}

impl TenantResponse {
    pub fn from_status(status: TenantStatus) -> Self {
        Self {
            id: status.tenant.id,
            workers: status.tenant.max_workers,
            worker_count: status.capacity.worker_count,
            idle_workers: status.capacity.idle,
            running_workers: status.capacity.running,
            queued_tasks: status.queue.queued,
            in_flight_tasks: status.queue.in_flight,
            max_nodes: status.tenant.max_nodes,
            max_clusters: status.tenant.max_clusters,
        }
    }
}

/// POST /tenants - create a tenant with an initial worker allocation.
pub async fn create(
    State(state): State<AppState>,
    Json(spec): Json<TenantSpec>,
) -> Result<Json<TenantResponse>, ApiError> {
    if spec.id.trim().is_empty() {
        return Err(ApiError::bad_request("tenant id must not be empty"));
    }

    let tenant = state.core.create_tenant(spec).await.map_err(ApiError::from)?;
    let status = state
        .core
        .tenant_status(&tenant.id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("tenant '{}'", tenant.id)))?;
    Ok(Json(TenantResponse::from_status(status)))
}

/// PUT /tenants/:id - resize a tenant's worker allocation.
pub async fn update(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(spec): Json<TenantSpec>,
) -> Result<Json<TenantResponse>, ApiError> {
    if spec.id != tenant_id {
        return Err(ApiError::bad_request(format!(
            "body tenant id '{}' does not match path '{}'",
            spec.id, tenant_id
        )));
    }

    state
        .core
        .update_tenant(&tenant_id, spec)
        .await
        .map_err(ApiError::from)?;
    let status = state
        .core
        .tenant_status(&tenant_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("tenant '{tenant_id}'")))?;
    Ok(Json(TenantResponse::from_status(status)))
}

/// DELETE /tenants/:id - 200 once the tenant is gone; 409 while any of its
/// workers is running a task.
pub async fn delete(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .core
        .delete_tenant(&tenant_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(json!({ "status": "deleted", "id": tenant_id })))
}

/// GET /tenants/:id
pub async fn get(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantResponse>, ApiError> {
    let status = state
        .core
        .tenant_status(&tenant_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("tenant '{tenant_id}'")))?;
    Ok(Json(TenantResponse::from_status(status)))
}

/// GET /tenants
pub async fn list(State(state): State<AppState>) -> Json<Vec<TenantResponse>> {
    let mut tenants: Vec<TenantResponse> = state
        .core
        .all_tenant_status()
        .await
        .into_iter()
        .map(TenantResponse::from_status)
        .collect();
    tenants.sort_by(|a, b| a.id.cmp(&b.id));
    Json(tenants)
}
