//! # Web API Error Types
//!
//! Error types specific to the web API and their HTTP response conversions.
//! thiserror for structure, Axum's IntoResponse for the HTTP mapping.
//! Failures surface as structured JSON bodies, never as raw internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::capacity::CapacityError;
use crate::dispatcher::DispatcherError;
use crate::error::ProvisionerError;

/// Web API errors with HTTP status code mappings.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("tenant '{tenant_id}' has workers running tasks")]
    TenantBusy { tenant_id: String },

    #[error("invalid request: {message}")]
    BadRequest { message: String },

    #[error("internal server error")]
    Internal { message: String },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            Self::TenantBusy { .. } => (StatusCode::CONFLICT, "TENANT_BUSY"),
            Self::BadRequest { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<ProvisionerError> for ApiError {
    fn from(error: ProvisionerError) -> Self {
        match error {
            ProvisionerError::Capacity(CapacityError::TenantBusy { tenant_id }) => {
                Self::TenantBusy { tenant_id }
            }
            ProvisionerError::Capacity(CapacityError::TenantExists { tenant_id }) => {
                Self::Conflict {
                    message: format!("tenant '{tenant_id}' already exists"),
                }
            }
            ProvisionerError::Capacity(CapacityError::UnknownTenant { tenant_id })
            | ProvisionerError::Dispatch(DispatcherError::UnknownTenant { tenant_id }) => {
                Self::NotFound {
                    resource: format!("tenant '{tenant_id}'"),
                }
            }
            ProvisionerError::Dispatch(DispatcherError::UnknownTask { task_id }) => {
                Self::NotFound {
                    resource: format!("task {task_id}"),
                }
            }
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            // internal detail stays in the logs, not the response body
            Self::Internal { message } => {
                tracing::error!(error = %message, "internal error serving request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
