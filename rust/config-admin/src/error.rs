//! Error kinds the admin surface surfaces (spec §7), mapped to HTTP
//! status the way `srql::error::ServiceError` maps its own variants —
//! never a panic, always a structured `{message, status}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    KeyUnresolved(String),

    #[error("KV backend unavailable: {0}")]
    KvUnavailable(String),

    #[error("no template registered for {0}")]
    TemplateUnavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("dependent service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<kvutil::KvError> for ServiceError {
    fn from(err: kvutil::KvError) -> Self {
        ServiceError::KvUnavailable(err.to_string())
    }
}

impl From<service_registry::RegistryError> for ServiceError {
    fn from(err: service_registry::RegistryError) -> Self {
        use service_registry::RegistryError::*;
        match err {
            DescriptorNotFound { .. } | DescriptorNotFoundForType { .. } => {
                ServiceError::NotFound(err.to_string())
            }
            MissingIdentity { .. } | UnresolvedPlaceholder { .. } | AmbiguousServiceType { .. } => {
                ServiceError::KeyUnresolved(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    status: u16,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::KeyUnresolved(_) => StatusCode::BAD_REQUEST,
            ServiceError::KvUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::TemplateUnavailable(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
