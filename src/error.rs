//! Handler-level error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::analytics::source::KpiError;
use crate::store::StoreError;
use crate::uploads::UploadError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("There was a problem fetching analytics data.")]
    Analytics(#[from] KpiError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(e) => match e {
                StoreError::InvalidCursor | StoreError::CursorMismatch => StatusCode::BAD_REQUEST,
                StoreError::UnknownField(_) => StatusCode::BAD_REQUEST,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Upload(_) | Self::Analytics(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, debug = ?self, "request failed");
        }

        // Internal details stay in the log.
        let error = match &self {
            Self::Internal(_) | Self::Store(_) if status.is_server_error() => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        let field = match &self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        };

        (status, Json(ErrorBody { error, field })).into_response()
    }
}
