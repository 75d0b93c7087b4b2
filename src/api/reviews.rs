use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::review::{
    ReviewAssignRequest, ReviewQueueQuery, ReviewStats, ReviewSubmitRequest, ReviewSubmitResponse,
    ReviewTaskResponse,
};
use crate::services::review_submission;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(review_queue))
        .route("/stats", get(review_stats))
        .route("/:task_id/assign", post(assign_review))
        .route("/:task_id/submit", post(submit_review))
}

async fn review_queue(
    CurrentUser(_reviewer): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ReviewQueueQuery>,
) -> Result<Json<Vec<ReviewTaskResponse>>, ApiError> {
    let reviews = state.reviews();
    let tasks =
        review_submission::review_queue(reviews.as_ref(), query.assignee.as_deref(), query.limit)
            .await?;
    Ok(Json(tasks.into_iter().map(ReviewTaskResponse::from).collect()))
}

async fn assign_review(
    CurrentUser(_caller): CurrentUser,
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<ReviewAssignRequest>,
) -> Result<Json<ReviewTaskResponse>, ApiError> {
    request.validate()?;
    let task = review_submission::assign_review(
        state.exams().as_ref(),
        state.reviews().as_ref(),
        &task_id,
        request.reviewer_id.as_deref(),
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(task.into()))
}

async fn submit_review(
    CurrentUser(reviewer_id): CurrentUser,
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<ReviewSubmitRequest>,
) -> Result<Json<ReviewSubmitResponse>, ApiError> {
    request.validate()?;
    let response = review_submission::submit_review(
        state.exams().as_ref(),
        state.reviews().as_ref(),
        &task_id,
        &request,
        Some(&reviewer_id),
        primitive_now_utc(),
    )
    .await?;
    Ok(Json(response))
}

async fn review_stats(
    CurrentUser(_caller): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ReviewStats>, ApiError> {
    Ok(Json(review_submission::review_stats(state.reviews().as_ref()).await?))
}
