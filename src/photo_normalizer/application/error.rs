use thiserror::Error;
use crate::domain::error::DomainError; // ドメインエラーをラップするため
use crate::infrastructure::error::InfrastructureError; // InfrastructureError をラップするため

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Input could not be decoded as an image: {0}")]
    Decode(String),

    #[error("Could not fit image into {max_bytes} bytes (smallest attempt was {smallest_size} bytes at {width}x{height})")]
    BudgetUnreachable {
        max_bytes: usize,
        smallest_size: usize,
        width: u32,
        height: u32,
    },

    #[error("Image normalization was cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Domain error occurred: {0}")]
    DomainError(#[from] DomainError), // ドメインエラーをラップ

    #[error("Infrastructure error occurred: {0}")]
    InfrastructureError(#[from] InfrastructureError), // InfrastructureError をラップ
}

// IntoResponse implementation for ApplicationError
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApplicationError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApplicationError::BudgetUnreachable { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApplicationError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApplicationError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApplicationError::DomainError(domain_err) => {
                (StatusCode::BAD_REQUEST, domain_err.to_string())
            }
            ApplicationError::InfrastructureError(infra_err) => {
                match infra_err {
                    InfrastructureError::DecodingError(_) | InfrastructureError::Base64DecodeError(_) => {
                        warn!(error = %infra_err, "rejected malformed upload");
                        (StatusCode::BAD_REQUEST, infra_err.to_string())
                    }
                    _ => {
                        error!(error = ?infra_err, "infrastructure error");
                        (StatusCode::INTERNAL_SERVER_ERROR, infra_err.to_string())
                    }
                }
            }
        };
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
