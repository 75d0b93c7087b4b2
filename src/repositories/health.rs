use serde::Serialize;
use sqlx::PgPool;

use crate::db::types::{ExamStatus, ReviewTaskStatus};

#[derive(Debug, Clone, Copy, Serialize, sqlx::FromRow)]
pub(crate) struct Backlog {
    pub(crate) in_progress: i64,
    pub(crate) open_reviews: i64,
}

pub(crate) async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub(crate) async fn backlog(pool: &PgPool) -> Result<Backlog, sqlx::Error> {
    let in_progress = ExamStatus::ALL
        .into_iter()
        .filter(|status| status.is_in_progress())
        .map(|status| status.as_str().to_string())
        .collect::<Vec<_>>();

    sqlx::query_as::<_, Backlog>(
        "SELECT
            (SELECT COUNT(*) FROM exams WHERE status::text = ANY($1)) AS in_progress,
            (SELECT COUNT(*) FROM review_tasks WHERE status IN ($2, $3)) AS open_reviews",
    )
    .bind(in_progress)
    .bind(ReviewTaskStatus::Pending)
    .bind(ReviewTaskStatus::InProgress)
    .fetch_one(pool)
    .await
}
