use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::remote::ProviderError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing file, missing cache entry, or a path outside the served roots.
    /// Deliberately carries no detail.
    #[error("file_not_found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(ProviderError::NotAvailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Provider(ProviderError::NotAuthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::Provider(ProviderError::NoDevice) => StatusCode::BAD_REQUEST,
            ApiError::Provider(ProviderError::RequestFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!("Request failed: {:#}", e);
        }
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
