use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::models::ExamRow;
use crate::db::types::ExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, user_id, subject, image_key, status, ocr_result, parsed_result, analysis_result, \
    diagnostic_report, report_artifact, error_message, revision, retry_requested, \
    lease_expires_at, stage_started_at, is_deleted, deleted_at, created_at, updated_at, \
    completed_at";

fn status_names(statuses: &[ExamStatus]) -> Vec<String> {
    statuses.iter().map(|status| status.as_str().to_string()).collect()
}

pub(crate) async fn insert(
    executor: impl PgExecutor<'_>,
    exam: &ExamRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exams (
            id, user_id, subject, image_key, status, revision, retry_requested,
            is_deleted, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(&exam.id)
    .bind(&exam.user_id)
    .bind(&exam.subject)
    .bind(&exam.image_key)
    .bind(exam.status)
    .bind(exam.revision)
    .bind(exam.retry_requested)
    .bind(exam.is_deleted)
    .bind(exam.created_at)
    .bind(exam.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row lock held until the surrounding transaction ends.
pub(crate) async fn lock_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_by_user(
    executor: impl PgExecutor<'_>,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE user_id = $1 AND NOT is_deleted
         ORDER BY created_at DESC
         LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Writes every mutable column back after an in-memory state change.
pub(crate) async fn write(
    executor: impl PgExecutor<'_>,
    exam: &ExamRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams
         SET status = $2,
             ocr_result = $3,
             parsed_result = $4,
             analysis_result = $5,
             diagnostic_report = $6,
             report_artifact = $7,
             error_message = $8,
             revision = $9,
             retry_requested = $10,
             lease_expires_at = $11,
             stage_started_at = $12,
             is_deleted = $13,
             deleted_at = $14,
             updated_at = $15,
             completed_at = $16
         WHERE id = $1",
    )
    .bind(&exam.id)
    .bind(exam.status)
    .bind(&exam.ocr_result)
    .bind(&exam.parsed_result)
    .bind(&exam.analysis_result)
    .bind(&exam.diagnostic_report)
    .bind(&exam.report_artifact)
    .bind(&exam.error_message)
    .bind(exam.revision)
    .bind(exam.retry_requested)
    .bind(exam.lease_expires_at)
    .bind(exam.stage_started_at)
    .bind(exam.is_deleted)
    .bind(exam.deleted_at)
    .bind(exam.updated_at)
    .bind(exam.completed_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Leases the oldest idle exam whose status has pending work.
pub(crate) async fn claim_next(
    executor: impl PgExecutor<'_>,
    now: PrimitiveDateTime,
    lease_until: PrimitiveDateTime,
    always: &[ExamStatus],
    on_retry: &[ExamStatus],
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id
            FROM exams
            WHERE NOT is_deleted
              AND (lease_expires_at IS NULL OR lease_expires_at < $1)
              AND (status::text = ANY($2) OR (retry_requested AND status::text = ANY($3)))
            ORDER BY updated_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE exams
        SET lease_expires_at = $4
        FROM candidate
        WHERE exams.id = candidate.id
        RETURNING exams.id",
    )
    .bind(now)
    .bind(status_names(always))
    .bind(status_names(on_retry))
    .bind(lease_until)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn release_lease(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET lease_expires_at = NULL WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn list_stale(
    executor: impl PgExecutor<'_>,
    in_progress: &[ExamStatus],
    started_before: PrimitiveDateTime,
) -> Result<Vec<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE status::text = ANY($1)
           AND stage_started_at < $2
         ORDER BY stage_started_at"
    ))
    .bind(status_names(in_progress))
    .bind(started_before)
    .fetch_all(executor)
    .await
}
