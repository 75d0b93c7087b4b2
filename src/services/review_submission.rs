use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::metrics::REVIEW_SUBMISSIONS;
use crate::db::models::{ExamRow, ReviewTaskRow};
use crate::db::types::{ExamStatus, ReviewTaskStatus};
use crate::repositories::store::{ExamStore, ReviewCommit, ReviewStore, StoreError};
use crate::schemas::review::{ReviewStats, ReviewSubmitRequest, ReviewSubmitResponse};
use crate::services::review_routing::{
    compute_review_stats, order_queue, reconcile, select_reviewer,
};
use crate::tasks::pipeline::state_machine;

/// Optimistic attempts before a racing pipeline commit is reported as a conflict.
const SUBMIT_ATTEMPTS: usize = 3;
pub(crate) const DEFAULT_QUEUE_LIMIT: i64 = 50;
const MAX_QUEUE_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub(crate) enum ReviewError {
    #[error("review task {0} not found")]
    TaskNotFound(String),
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("review task is already {0:?}")]
    TaskClosed(ReviewTaskStatus),
    #[error("exam has been deleted")]
    ExamDeleted,
    #[error("exam in status {0} does not accept corrections yet")]
    NotReady(ExamStatus),
    #[error("exam has no analysis result")]
    MissingAnalysis,
    #[error("question {0} is not part of the analysis")]
    QuestionNotFound(String),
    #[error("no active reviewer available")]
    NoReviewer,
    #[error("exam changed concurrently; retry the submission")]
    Conflict,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ExamNotFound(id) => ReviewError::ExamNotFound(id),
            StoreError::TaskNotFound(id) => ReviewError::TaskNotFound(id),
            StoreError::TaskClosed(status) => ReviewError::TaskClosed(status),
            StoreError::Deleted => ReviewError::ExamDeleted,
            other => ReviewError::Store(other),
        }
    }
}

/// Statuses in which a stored analysis exists and may be overwritten by a teacher.
pub(crate) fn correction_allowed(status: ExamStatus) -> bool {
    matches!(
        status,
        ExamStatus::Analyzed
            | ExamStatus::Diagnosing
            | ExamStatus::Diagnosed
            | ExamStatus::DiagnosingFailed
            | ExamStatus::ReportGenerating
            | ExamStatus::ReportGenerated
            | ExamStatus::ReportGenerationFailed
            | ExamStatus::Completed
            | ExamStatus::Reviewed
    )
}

/// Where the exam goes after a correction. In-flight and failed stages keep their
/// status; the revision bump alone makes their eventual commit stale.
fn status_after_correction(status: ExamStatus, regenerate: bool) -> Option<ExamStatus> {
    let idle = !status.is_in_progress() && !status.is_failure();
    (regenerate && idle && state_machine::can_transition(status, ExamStatus::Reviewed))
        .then_some(ExamStatus::Reviewed)
}

pub(crate) async fn submit_review(
    exams: &dyn ExamStore,
    reviews: &dyn ReviewStore,
    task_id: &str,
    request: &ReviewSubmitRequest,
    reviewer_id: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<ReviewSubmitResponse, ReviewError> {
    for attempt in 1..=SUBMIT_ATTEMPTS {
        let (task, exam) = load_open_task(exams, reviews, task_id).await?;
        if !correction_allowed(exam.status) {
            return Err(ReviewError::NotReady(exam.status));
        }
        let mut analysis = exam
            .analysis_result
            .as_ref()
            .map(|json| json.0.clone())
            .ok_or(ReviewError::MissingAnalysis)?;

        let judgment = request.teacher_judgment.clone();
        let reconciliation = reconcile(&mut analysis, &task.question_id, &judgment)
            .ok_or_else(|| ReviewError::QuestionNotFound(task.question_id.clone()))?;

        let commit = ReviewCommit {
            task_id: task.id.clone(),
            exam_id: exam.id.clone(),
            expected_status: exam.status,
            expected_revision: exam.revision,
            analysis,
            new_status: status_after_correction(exam.status, reconciliation.regenerate),
            bump_revision: reconciliation.regenerate,
            teacher_judgment: judgment,
            comment: request.comment.clone(),
            reviewer_id: reviewer_id.map(str::to_string),
            now,
        };

        match reviews.commit_review(commit).await {
            Ok((exam, task)) => {
                let outcome = if reconciliation.regenerate { "regenerate" } else { "unchanged" };
                metrics::counter!(REVIEW_SUBMISSIONS, "outcome" => outcome).increment(1);
                tracing::info!(
                    task_id = %task.id,
                    exam_id = %exam.id,
                    question_id = %task.question_id,
                    status = %exam.status,
                    revision = exam.revision,
                    regenerate = reconciliation.regenerate,
                    "teacher correction stored"
                );
                return Ok(ReviewSubmitResponse {
                    task: task.into(),
                    regeneration_triggered: reconciliation.regenerate,
                    exam_revision: exam.revision,
                });
            }
            Err(err) if err.is_conflict() && !matches!(err, StoreError::Deleted) => {
                tracing::debug!(
                    task_id,
                    attempt,
                    error = %err,
                    "review commit raced a pipeline write"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    metrics::counter!(REVIEW_SUBMISSIONS, "outcome" => "conflict").increment(1);
    Err(ReviewError::Conflict)
}

async fn load_open_task(
    exams: &dyn ExamStore,
    reviews: &dyn ReviewStore,
    task_id: &str,
) -> Result<(ReviewTaskRow, ExamRow), ReviewError> {
    let task = reviews
        .find_task(task_id)
        .await?
        .ok_or_else(|| ReviewError::TaskNotFound(task_id.to_string()))?;
    if !task.status.is_open() {
        return Err(ReviewError::TaskClosed(task.status));
    }
    let exam = exams
        .find_exam(&task.exam_id)
        .await?
        .ok_or_else(|| ReviewError::ExamNotFound(task.exam_id.clone()))?;
    if exam.is_deleted {
        return Err(ReviewError::ExamDeleted);
    }
    Ok((task, exam))
}

/// Assigns to `reviewer_id`, or to the best-fitting active reviewer when none is given.
pub(crate) async fn assign_review(
    exams: &dyn ExamStore,
    reviews: &dyn ReviewStore,
    task_id: &str,
    reviewer_id: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<ReviewTaskRow, ReviewError> {
    let (task, exam) = load_open_task(exams, reviews, task_id).await?;

    let reviewer_id = match reviewer_id {
        Some(reviewer_id) => reviewer_id.to_string(),
        None => {
            let pool = reviews.reviewer_loads().await?;
            select_reviewer(&pool, exam_subject(&exam).as_deref())
                .map(|reviewer| reviewer.reviewer_id.clone())
                .ok_or(ReviewError::NoReviewer)?
        }
    };

    let task = reviews.assign_task(&task.id, &reviewer_id, now).await?;
    tracing::info!(task_id = %task.id, reviewer_id, "review task assigned");
    Ok(task)
}

fn exam_subject(exam: &ExamRow) -> Option<String> {
    exam.subject.clone().or_else(|| {
        exam.parsed_result.as_ref().and_then(|parsed| parsed.0.exam_meta.subject.clone())
    })
}

pub(crate) async fn review_queue(
    reviews: &dyn ReviewStore,
    assignee: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<ReviewTaskRow>, ReviewError> {
    let limit = limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, MAX_QUEUE_LIMIT);
    let mut tasks = reviews.list_open_tasks(assignee, limit).await?;
    order_queue(&mut tasks);
    Ok(tasks)
}

pub(crate) async fn review_stats(reviews: &dyn ReviewStore) -> Result<ReviewStats, ReviewError> {
    let tasks = reviews.list_tasks().await?;
    Ok(compute_review_stats(&tasks))
}
