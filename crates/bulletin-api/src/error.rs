use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use bulletin_types::models::CommentId;
use bulletin_types::repository::StoreError;

use crate::tree::TreeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    InvalidParent(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("comment thread only partially deleted")]
    PartialDeletion {
        removed: Vec<CommentId>,
        remaining: Vec<CommentId>,
    },
    #[error("storage temporarily unavailable")]
    Unavailable,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidParent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PartialDeletion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidParent(_) => "invalid_parent",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::PartialDeletion { .. } => "partial_deletion",
            ApiError::Unavailable => "storage_unavailable",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => {
                error!("Storage unavailable: {}", reason);
                ApiError::Unavailable
            }
            StoreError::Constraint(reason) => ApiError::Conflict(reason),
        }
    }
}

impl From<TreeError> for ApiError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::EmptyField(_) => ApiError::Validation(e.to_string()),
            TreeError::InvalidParent { .. } => ApiError::InvalidParent(e.to_string()),
            TreeError::ContentNotFound(_) | TreeError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TreeError::PartialDeletion { removed, remaining, .. } => ApiError::PartialDeletion { removed, remaining },
            TreeError::Storage(store) => store.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<Vec<CommentId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<Vec<CommentId>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();
        let (removed, remaining) = match self {
            ApiError::PartialDeletion { removed, remaining } => (Some(removed), Some(remaining)),
            _ => (None, None),
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                code,
                message,
                removed,
                remaining,
            },
        };
        (status, Json(body)).into_response()
    }
}
