use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::store::StoreError;
use crate::services::review_submission::ReviewError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => message.to_string(),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => message,
        };
        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ExamNotFound(_) | StoreError::Deleted => {
                ApiError::NotFound("Exam not found".to_string())
            }
            StoreError::TaskNotFound(_) => ApiError::NotFound("Review task not found".to_string()),
            StoreError::StatusMismatch { .. }
            | StoreError::RevisionMismatch { .. }
            | StoreError::NotRetryable(_)
            | StoreError::TaskClosed(_)
            | StoreError::Illegal(_) => ApiError::Conflict(err.to_string()),
            StoreError::Backend(err) => {
                ApiError::internal(format!("{err:#}"), "Storage backend failure")
            }
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::TaskNotFound(_) => ApiError::NotFound("Review task not found".to_string()),
            ReviewError::ExamNotFound(_) | ReviewError::ExamDeleted => {
                ApiError::NotFound("Exam not found".to_string())
            }
            ReviewError::QuestionNotFound(_) => ApiError::NotFound(err.to_string()),
            ReviewError::TaskClosed(_)
            | ReviewError::NotReady(_)
            | ReviewError::MissingAnalysis
            | ReviewError::NoReviewer
            | ReviewError::Conflict => ApiError::Conflict(err.to_string()),
            ReviewError::Store(err) => err.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamStatus;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let not_found: ApiError = StoreError::ExamNotFound("e1".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = StoreError::NotRetryable(ExamStatus::Completed).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let backend: ApiError = StoreError::Backend(anyhow::anyhow!("pool closed")).into();
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn review_errors_map_to_http_statuses() {
        let closed: ApiError = ReviewError::NotReady(ExamStatus::Analyzing).into();
        assert!(matches!(closed, ApiError::Conflict(ref message) if message.contains("analyzing")));

        let deleted: ApiError = ReviewError::ExamDeleted.into();
        assert_eq!(deleted.status(), StatusCode::NOT_FOUND);
    }
}
