use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::capture::CaptureError;
use crate::db::StoreError;
use crate::models::vin::VinError;
use crate::services::nhtsa::DecoderError;
use crate::services::resolver::ResolveError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid VIN: {0}")]
    InvalidVin(#[from] VinError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Unsupported media type")]
    UnsupportedMediaType,

    #[error("VIN decoder unavailable")]
    Upstream(#[source] DecoderError),

    #[error("Internal server error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateVin(_) | StoreError::DuplicatePlate(_) => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::ClientNotFound(_) => ApiError::NotFound("Client not found"),
            StoreError::EmployeeNotFound(_) => ApiError::NotFound("Employee not found"),
            StoreError::Database(e) => ApiError::Internal(Box::new(e)),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidVin(e) => ApiError::InvalidVin(e),
            ResolveError::LocalLookup(e) => e.into(),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::InvalidFrame => ApiError::UnsupportedMediaType,
            other => ApiError::Conflict(other.to_string()),
        }
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::BadRequest(report.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::InvalidVin(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upstream(e) => {
                tracing::warn!(error = %e, "External VIN decoder request failed");
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
