use sqlx::PgExecutor;

use crate::db::models::ReviewerRow;
use crate::db::types::ReviewTaskStatus;
use crate::services::review_routing::ReviewerLoad;

#[derive(Debug, sqlx::FromRow)]
struct LoadRow {
    reviewer_id: String,
    subject: Option<String>,
    workload: i64,
}

/// Active reviewers with their in-progress task counts, in registration order.
pub(crate) async fn list_loads(
    executor: impl PgExecutor<'_>,
) -> Result<Vec<ReviewerLoad>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LoadRow>(
        "SELECT r.id AS reviewer_id, r.subject, COUNT(t.id) AS workload
         FROM reviewers r
         LEFT JOIN review_tasks t ON t.assigned_to = r.id AND t.status = $1
         WHERE r.is_active
         GROUP BY r.id, r.subject, r.created_at
         ORDER BY r.created_at, r.id",
    )
    .bind(ReviewTaskStatus::InProgress)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ReviewerLoad {
            reviewer_id: row.reviewer_id,
            subject: row.subject,
            workload: row.workload,
        })
        .collect())
}

pub(crate) async fn insert(
    executor: impl PgExecutor<'_>,
    reviewer: &ReviewerRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO reviewers (id, name, subject, is_active, created_at)
         VALUES ($1,$2,$3,$4,$5)
         ON CONFLICT (id) DO UPDATE
         SET name = EXCLUDED.name, subject = EXCLUDED.subject, is_active = EXCLUDED.is_active",
    )
    .bind(&reviewer.id)
    .bind(&reviewer.name)
    .bind(&reviewer.subject)
    .bind(reviewer.is_active)
    .bind(reviewer.created_at)
    .execute(executor)
    .await?;
    Ok(())
}
