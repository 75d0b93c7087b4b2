use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::{normalize_subject, validate_image_upload};
use crate::core::metrics::EXAM_UPLOADS;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::ExamRow;
use crate::schemas::exam::{
    ExamCreatedResponse, ExamDetailResponse, ExamListQuery, ExamRetryResponse, ExamSummaryResponse,
};
use crate::services::storage::exam_image_key;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_exam).get(list_exams))
        .route("/:exam_id", get(get_exam).delete(delete_exam))
        .route("/:exam_id/retry", post(retry_exam))
}

struct UploadForm {
    bytes: Vec<u8>,
    filename: String,
    content_type: String,
    subject: Option<String>,
}

async fn read_upload_form(
    multipart: &mut Multipart,
    max_bytes: u64,
    max_mb: u64,
) -> Result<UploadForm, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut subject: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            filename = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                    return Err(ApiError::BadRequest(format!("File size exceeds {max_mb}MB limit")));
                }
                bytes.extend_from_slice(&chunk);
            }
            file_bytes = Some(bytes);
        } else if name == "subject" {
            let text = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid subject".to_string()))?;
            subject = normalize_subject(&text)?;
        }
    }

    let bytes = file_bytes
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;

    Ok(UploadForm {
        bytes,
        filename: filename.unwrap_or_else(|| "exam.jpg".to_string()),
        content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
        subject,
    })
}

async fn upload_exam(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ExamCreatedResponse>), ApiError> {
    let storage_settings = state.settings().storage();
    let max_mb = storage_settings.max_upload_size_mb;
    let form = read_upload_form(&mut multipart, max_mb * 1024 * 1024, max_mb).await?;
    let extension = validate_image_upload(
        &form.filename,
        &form.content_type,
        &storage_settings.allowed_image_extensions,
    )?;

    let exam_id = Uuid::new_v4().to_string();
    let key = exam_image_key(&exam_id, &extension);

    match state.storage() {
        Some(storage) => {
            let stored = storage
                .upload_bytes(&key, &form.content_type, form.bytes)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to upload exam image"))?;
            tracing::info!(
                exam_id = %exam_id,
                key = %stored.key,
                size = stored.size,
                sha256 = %stored.sha256,
                "Exam image stored"
            );
        }
        None if state.settings().pipeline().use_mock_services => {
            tracing::warn!(
                exam_id = %exam_id,
                "S3 storage not configured; mock pipeline ignores image bytes"
            );
        }
        None => {
            return Err(ApiError::ServiceUnavailable("S3 storage is not configured".to_string()));
        }
    }

    let exam = ExamRow::new(exam_id, user_id, form.subject, key, primitive_now_utc());
    state.exams().insert_exam(&exam).await?;
    metrics::counter!(EXAM_UPLOADS).increment(1);
    tracing::info!(
        exam_id = %exam.id,
        user_id = %exam.user_id,
        subject = ?exam.subject,
        "Exam uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(ExamCreatedResponse {
            id: exam.id,
            status: exam.status,
            created_at: format_primitive(exam.created_at),
        }),
    ))
}

async fn list_exams(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<Vec<ExamSummaryResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let exams = state.exams().list_exams(&user_id, limit).await?;
    Ok(Json(exams.iter().map(ExamSummaryResponse::from).collect()))
}

async fn get_exam(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamDetailResponse>, ApiError> {
    let exam = state
        .exams()
        .find_exam(&exam_id)
        .await?
        .filter(|exam| exam.user_id == user_id && !exam.is_deleted)
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    Ok(Json(exam.into()))
}

async fn delete_exam(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let exam = state
        .exams()
        .soft_delete(&exam_id, &user_id, primitive_now_utc())
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    tracing::info!(exam_id = %exam.id, status = %exam.status, "Exam deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn retry_exam(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<(StatusCode, Json<ExamRetryResponse>), ApiError> {
    let exam = state.exams().request_retry(&exam_id, &user_id, primitive_now_utc()).await?;
    tracing::info!(exam_id = %exam.id, status = %exam.status, "Retry requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(ExamRetryResponse {
            id: exam.id,
            status: exam.status,
            retry_requested: exam.retry_requested,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::router::router;
    use crate::db::types::ExamStatus;
    use crate::test_support::{self, MemoryStore};

    fn multipart_body(
        boundary: &str,
        filename: &str,
        content_type: &str,
        subject: &str,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"subject\"\r\n\r\n\
                 {subject}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"\xff\xd8\xff\xe0fake-jpeg");
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn upload_with_mock_services_creates_exam() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("USE_MOCK_SERVICES", "true");

        let store = MemoryStore::shared();
        let app = router(test_support::api_state(store.clone()));
        let boundary = "exam-boundary";
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/exams")
                    .header("x-user-id", "teacher-1")
                    .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(multipart_body(boundary, "paper.jpg", "image/jpeg", "数学")))
                    .unwrap(),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "uploaded");

        let exam = store.exam(json["id"].as_str().unwrap());
        assert_eq!(exam.user_id, "teacher-1");
        assert_eq!(exam.subject.as_deref(), Some("数学"));
        assert!(exam.image_key.ends_with("/original.jpg"));
    }

    #[tokio::test]
    async fn upload_rejects_mismatched_mime() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("USE_MOCK_SERVICES", "true");

        let app = router(test_support::api_state(MemoryStore::shared()));
        let boundary = "exam-boundary";
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/exams")
                    .header("x-user-id", "teacher-1")
                    .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(multipart_body(boundary, "paper.png", "image/jpeg", "")))
                    .unwrap(),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exams_require_caller_identity() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let app = router(test_support::api_state(MemoryStore::shared()));
        let response = app
            .oneshot(Request::builder().uri("/api/v1/exams").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_delete_exam() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let store = MemoryStore::shared();
        store.insert_exam_row(test_support::uploaded_exam("exam-1"));
        let app = router(test_support::api_state(store.clone()));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/exams/exam-1")
                    .header("x-user-id", "someone-else")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/exams/exam-1")
                    .header("x-user-id", "someone-else")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!store.exam("exam-1").is_deleted);
    }

    #[tokio::test]
    async fn retry_marks_failed_exam_and_rejects_healthy_one() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let store = MemoryStore::shared();
        let mut failed = test_support::uploaded_exam("failed");
        failed.status = ExamStatus::OcrFailed;
        store.insert_exam_row(failed);
        store.insert_exam_row(test_support::uploaded_exam("fresh"));
        let app = router(test_support::api_state(store.clone()));

        let retry = |exam_id: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/exams/{exam_id}/retry"))
                .header("x-user-id", test_support::OWNER)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(retry("failed")).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(store.exam("failed").retry_requested);

        let response = app.oneshot(retry("fresh")).await.expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
