//! Error types for the OCR ingest server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ingest::IngestError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            AppError::Ingest(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    tracing::error!(code = e.code(), "Ingestion failed: {}", e);
                } else {
                    tracing::info!(code = e.code(), "Ingestion rejected: {}", e);
                }
                (status, e.code(), e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_status_mapping() {
        let empty = AppError::from(IngestError::EmptyExtraction).into_response();
        assert_eq!(empty.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let conversion = AppError::from(IngestError::ConversionFailed {
            reason: "exit status: 1".into(),
            stderr: String::new(),
        })
        .into_response();
        assert_eq!(conversion.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_errors() {
        assert_eq!(
            AppError::BadRequest("missing file".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PayloadTooLarge("over limit".into()).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::Unauthorized("no identity".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
