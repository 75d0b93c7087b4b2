use sqlx::types::Json;
use sqlx::PgExecutor;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::ReviewTaskRow;
use crate::db::types::ReviewTaskStatus;
use crate::services::review_routing::NewReviewTask;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, question_id, priority, status, assigned_to, ai_judgment, teacher_judgment, \
    teacher_comment, created_at, assigned_at, completed_at";

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<ReviewTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, ReviewTaskRow>(&format!("SELECT {COLUMNS} FROM review_tasks WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<ReviewTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, ReviewTaskRow>(&format!(
        "SELECT {COLUMNS} FROM review_tasks WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Pending and in-progress tasks, most urgent first.
pub(crate) async fn list_open(
    executor: impl PgExecutor<'_>,
    assignee: Option<&str>,
    limit: i64,
) -> Result<Vec<ReviewTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, ReviewTaskRow>(&format!(
        "SELECT {COLUMNS} FROM review_tasks
         WHERE status IN ($1, $2)
           AND ($3::text IS NULL OR assigned_to = $3)
         ORDER BY priority, created_at
         LIMIT $4"
    ))
    .bind(ReviewTaskStatus::Pending)
    .bind(ReviewTaskStatus::InProgress)
    .bind(assignee)
    .bind(limit)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_all(
    executor: impl PgExecutor<'_>,
) -> Result<Vec<ReviewTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, ReviewTaskRow>(&format!("SELECT {COLUMNS} FROM review_tasks"))
        .fetch_all(executor)
        .await
}

pub(crate) async fn cancel_open_for_exam(
    executor: impl PgExecutor<'_>,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE review_tasks
         SET status = $1, completed_at = $2
         WHERE exam_id = $3 AND status IN ($4, $5)",
    )
    .bind(ReviewTaskStatus::Cancelled)
    .bind(now)
    .bind(exam_id)
    .bind(ReviewTaskStatus::Pending)
    .bind(ReviewTaskStatus::InProgress)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn insert(
    executor: impl PgExecutor<'_>,
    exam_id: &str,
    task: &NewReviewTask,
    now: PrimitiveDateTime,
) -> Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO review_tasks (
            id, exam_id, question_id, priority, status, ai_judgment, created_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(&id)
    .bind(exam_id)
    .bind(&task.question_id)
    .bind(task.priority)
    .bind(ReviewTaskStatus::Pending)
    .bind(Json(&task.ai_judgment))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(id)
}

pub(crate) async fn write(
    executor: impl PgExecutor<'_>,
    task: &ReviewTaskRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE review_tasks
         SET status = $2,
             assigned_to = $3,
             teacher_judgment = $4,
             teacher_comment = $5,
             assigned_at = $6,
             completed_at = $7
         WHERE id = $1",
    )
    .bind(&task.id)
    .bind(task.status)
    .bind(&task.assigned_to)
    .bind(&task.teacher_judgment)
    .bind(&task.teacher_comment)
    .bind(task.assigned_at)
    .bind(task.completed_at)
    .execute(executor)
    .await?;
    Ok(())
}
