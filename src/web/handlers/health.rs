//! Health and status endpoints for monitoring and load balancing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::web::handlers::tenants::TenantResponse;
use crate::web::state::AppState;

/// Basic liveness response.
#[derive(Serialize)]
pub struct HeartbeatResponse {
    status: String,
    timestamp: String,
}

/// Aggregate process status: per-tenant queue and worker counters.
#[derive(Serialize)]
pub struct StatusResponse {
    status: String,
    timestamp: String,
    version: String,
    tenants: Vec<TenantResponse>,
}

/// GET /heartbeat - 200 whenever the process is up.
pub async fn heartbeat(_state: State<AppState>) -> Json<HeartbeatResponse> {
    Json(HeartbeatResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /status - 200 plus the live tenant/queue counters the external
/// metrics collector scrapes.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut tenants: Vec<TenantResponse> = state
        .core
        .all_tenant_status()
        .await
        .into_iter()
        .map(TenantResponse::from_status)
        .collect();
    tenants.sort_by(|a, b| a.id.cmp(&b.id));

    Json(StatusResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: crate::constants::system::VERSION.to_string(),
        tenants,
    })
}
