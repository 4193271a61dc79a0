//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use compensation::CompensationError;
use gateway::GatewayError;
use project::ProjectError;
use tcc::{ErrorKind, TransactionError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Caller identity headers missing or malformed.
    Unauthorized(String),
    /// Caller may not perform the operation.
    Forbidden(String),
    /// A collaborator is unavailable.
    Unavailable(String),
    /// Transaction failure, tagged with its phase.
    Transaction(TransactionError),
    /// Compensation failure.
    Compensation(CompensationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, serde_json::json!({ "error": msg })),
            ApiError::Unavailable(msg) => {
                tracing::error!(error = %msg, "collaborator unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({ "error": msg }))
            }
            ApiError::Transaction(err) => {
                let status = transaction_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, kind = %err.kind(), "transaction failed");
                }
                (
                    status,
                    serde_json::json!({
                        "error": err.to_string(),
                        "kind": err.kind(),
                        "phase": err.phase(),
                    }),
                )
            }
            ApiError::Compensation(err) => (
                compensation_status(&err),
                serde_json::json!({ "error": err.to_string() }),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn transaction_status(err: &TransactionError) -> StatusCode {
    match err {
        TransactionError::ProjectNotFound { .. } | TransactionError::RepositoryNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        TransactionError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TransactionError::Execution(GatewayError::Conflict(_)) => StatusCode::CONFLICT,
        TransactionError::ProjectLookup(_) | TransactionError::Cancelled { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => match err.kind() {
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::ValidationFailure | ErrorKind::ExecutionFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::ConfirmationFailure => StatusCode::CONFLICT,
            ErrorKind::CompensationFailure => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn compensation_status(err: &CompensationError) -> StatusCode {
    match err {
        CompensationError::NotFound(_) => StatusCode::NOT_FOUND,
        CompensationError::RetriesExhausted { .. } | CompensationError::NotArmed { .. } => {
            StatusCode::CONFLICT
        }
        CompensationError::ExecutionFailed { .. } => StatusCode::BAD_GATEWAY,
        CompensationError::UnknownAction(_) => StatusCode::BAD_REQUEST,
        CompensationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<ProjectError> for ApiError {
    fn from(err: ProjectError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

impl From<TransactionError> for ApiError {
    fn from(err: TransactionError) -> Self {
        ApiError::Transaction(err)
    }
}

impl From<CompensationError> for ApiError {
    fn from(err: CompensationError) -> Self {
        ApiError::Compensation(err)
    }
}
