//! HTTP mapping of engine errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use engine::{EngineError, RepositoryError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("metrics export failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Engine(e) => match e {
                EngineError::InstanceNotFound(_) | EngineError::DefinitionNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                EngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INSTANCE_CLOSED"),
                EngineError::Repository(RepositoryError::Conflict { .. }) => (StatusCode::CONFLICT, "CONFLICT"),
                EngineError::NoApprover(_) | EngineError::NoEscalationTarget(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "NOT_ROUTABLE")
                }
                EngineError::Delivery(_) => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Metrics(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse { error: self.to_string(), code: code.to_string() };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
