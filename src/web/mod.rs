//! # Web API
//!
//! REST surface consumed by the web console and external tooling:
//!
//! - `GET /status`, `GET /heartbeat` - process health and per-tenant counters
//! - `POST /tenants`, `PUT /tenants/:id`, `DELETE /tenants/:id`,
//!   `GET /tenants`, `GET /tenants/:id` - tenant CRUD
//! - `POST /tasks`, `GET /tasks/:id` - task submission and status

pub mod errors;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::ProvisionerCore;

pub use errors::ApiError;
pub use state::AppState;

/// Build the API router over a running core.
pub fn router(core: Arc<ProvisionerCore>) -> Router {
    let state = AppState::new(core);

    Router::new()
        .route("/status", get(handlers::health::status))
        .route("/heartbeat", get(handlers::health::heartbeat))
        .route(
            "/tenants",
            get(handlers::tenants::list).post(handlers::tenants::create),
        )
        .route(
            "/tenants/:id",
            get(handlers::tenants::get)
                .put(handlers::tenants::update)
                .delete(handlers::tenants::delete),
        )
        .route("/tasks", post(handlers::tasks::submit))
        .route("/tasks/:id", get(handlers::tasks::get))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
