use async_trait::async_trait;
use sqlx::types::Json;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{ExamRow, ReviewTaskRow};
use crate::db::types::{ExamStatus, ReviewTaskStatus};
use crate::schemas::analysis::AnalysisResult;
use crate::schemas::diagnostic::{DiagnosticReport, ReportArtifact};
use crate::schemas::ocr::OcrResult;
use crate::schemas::parser::ParsedExam;
use crate::schemas::review::TeacherJudgment;
use crate::services::review_routing::{NewReviewTask, ReviewerLoad};
use crate::tasks::pipeline::state_machine::{self, IllegalTransition, Stage};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("review task {0} not found")]
    TaskNotFound(String),
    #[error("exam status is {current}, expected {expected}")]
    StatusMismatch { expected: ExamStatus, current: ExamStatus },
    #[error("exam revision is {current}, expected {expected}")]
    RevisionMismatch { expected: i64, current: i64 },
    #[error("exam has been deleted")]
    Deleted,
    #[error("exam in status {0} has no failed stage to retry")]
    NotRetryable(ExamStatus),
    #[error("review task is already {0:?}")]
    TaskClosed(ReviewTaskStatus),
    #[error(transparent)]
    Illegal(#[from] IllegalTransition),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

impl StoreError {
    /// Rejections caused by a concurrent writer rather than by the backend.
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::StatusMismatch { .. }
                | StoreError::RevisionMismatch { .. }
                | StoreError::Deleted
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum StageOutput {
    Nothing,
    Ocr(OcrResult),
    Parsed(ParsedExam),
    Analysis { result: AnalysisResult, review_tasks: Vec<NewReviewTask> },
    Diagnosis(DiagnosticReport),
    Report(ReportArtifact),
}

/// Compare-and-set status change, optionally carrying a stage result.
#[derive(Debug, Clone)]
pub(crate) struct ExamTransition {
    pub(crate) exam_id: String,
    pub(crate) from: ExamStatus,
    pub(crate) to: ExamStatus,
    pub(crate) expected_revision: Option<i64>,
    pub(crate) output: StageOutput,
    pub(crate) error_message: Option<String>,
    pub(crate) now: PrimitiveDateTime,
}

impl ExamTransition {
    pub(crate) fn new(
        exam_id: &str,
        from: ExamStatus,
        to: ExamStatus,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            exam_id: exam_id.to_string(),
            from,
            to,
            expected_revision: None,
            output: StageOutput::Nothing,
            error_message: None,
            now,
        }
    }

    pub(crate) fn with_output(mut self, output: StageOutput) -> Self {
        self.output = output;
        self
    }

    pub(crate) fn with_revision(mut self, revision: i64) -> Self {
        self.expected_revision = Some(revision);
        self
    }

    pub(crate) fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Applies a transition to an in-memory row. Returns the review tasks to replace, if any.
pub(crate) fn apply_transition(
    exam: &mut ExamRow,
    change: &ExamTransition,
) -> Result<Option<Vec<NewReviewTask>>, StoreError> {
    if exam.status != change.from {
        return Err(StoreError::StatusMismatch { expected: change.from, current: exam.status });
    }
    state_machine::transition(change.from, change.to)?;
    if exam.is_deleted && !change.to.is_failure() {
        return Err(StoreError::Deleted);
    }
    if let Some(expected) = change.expected_revision {
        if exam.revision != expected {
            return Err(StoreError::RevisionMismatch { expected, current: exam.revision });
        }
    }

    exam.status = change.to;
    exam.updated_at = change.now;

    if change.to.is_in_progress() {
        exam.stage_started_at = Some(change.now);
        exam.retry_requested = false;
        exam.error_message = None;
    } else {
        exam.stage_started_at = None;
        exam.error_message =
            if change.to.is_failure() { change.error_message.clone() } else { None };
    }

    if change.to == ExamStatus::Completed {
        exam.completed_at = Some(change.now);
    }

    let mut review_tasks = None;
    match &change.output {
        StageOutput::Nothing => {}
        StageOutput::Ocr(result) => exam.ocr_result = Some(Json(result.clone())),
        StageOutput::Parsed(result) => exam.parsed_result = Some(Json(result.clone())),
        StageOutput::Analysis { result, review_tasks: tasks } => {
            exam.analysis_result = Some(Json(result.clone()));
            exam.revision += 1;
            review_tasks = Some(tasks.clone());
        }
        StageOutput::Diagnosis(report) => exam.diagnostic_report = Some(Json(report.clone())),
        StageOutput::Report(artifact) => exam.report_artifact = Some(Json(artifact.clone())),
    }

    Ok(review_tasks)
}

pub(crate) fn apply_retry_request(
    exam: &mut ExamRow,
    now: PrimitiveDateTime,
) -> Result<(), StoreError> {
    if exam.is_deleted {
        return Err(StoreError::Deleted);
    }
    if Stage::for_failure(exam.status).is_none() && exam.status != ExamStatus::Reviewed {
        return Err(StoreError::NotRetryable(exam.status));
    }
    exam.retry_requested = true;
    exam.updated_at = now;
    Ok(())
}

/// Marks an exam deleted. Returns false when it already was.
pub(crate) fn apply_soft_delete(exam: &mut ExamRow, now: PrimitiveDateTime) -> bool {
    if exam.is_deleted {
        return false;
    }
    exam.is_deleted = true;
    exam.deleted_at = Some(now);
    exam.retry_requested = false;
    exam.updated_at = now;
    true
}

/// Teacher correction written back together with its review task.
#[derive(Debug, Clone)]
pub(crate) struct ReviewCommit {
    pub(crate) task_id: String,
    pub(crate) exam_id: String,
    pub(crate) expected_status: ExamStatus,
    pub(crate) expected_revision: i64,
    pub(crate) analysis: AnalysisResult,
    pub(crate) new_status: Option<ExamStatus>,
    pub(crate) bump_revision: bool,
    pub(crate) teacher_judgment: TeacherJudgment,
    pub(crate) comment: Option<String>,
    pub(crate) reviewer_id: Option<String>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) fn apply_review(
    exam: &mut ExamRow,
    task: &mut ReviewTaskRow,
    commit: &ReviewCommit,
) -> Result<(), StoreError> {
    if !task.status.is_open() {
        return Err(StoreError::TaskClosed(task.status));
    }
    if exam.is_deleted {
        return Err(StoreError::Deleted);
    }
    if exam.status != commit.expected_status {
        return Err(StoreError::StatusMismatch {
            expected: commit.expected_status,
            current: exam.status,
        });
    }
    if exam.revision != commit.expected_revision {
        return Err(StoreError::RevisionMismatch {
            expected: commit.expected_revision,
            current: exam.revision,
        });
    }
    if let Some(next) = commit.new_status {
        state_machine::transition(exam.status, next)?;
        exam.status = next;
    }

    exam.analysis_result = Some(Json(commit.analysis.clone()));
    if commit.bump_revision {
        exam.revision += 1;
    }
    exam.updated_at = commit.now;

    task.status = ReviewTaskStatus::Completed;
    task.teacher_judgment = Some(Json(commit.teacher_judgment.clone()));
    task.teacher_comment = commit.comment.clone();
    if let Some(reviewer_id) = &commit.reviewer_id {
        task.assigned_to.get_or_insert_with(|| reviewer_id.clone());
    }
    task.assigned_at.get_or_insert(commit.now);
    task.completed_at = Some(commit.now);
    Ok(())
}

pub(crate) fn apply_assignment(
    task: &mut ReviewTaskRow,
    reviewer_id: &str,
    now: PrimitiveDateTime,
) -> Result<(), StoreError> {
    if !task.status.is_open() {
        return Err(StoreError::TaskClosed(task.status));
    }
    task.status = ReviewTaskStatus::InProgress;
    task.assigned_to = Some(reviewer_id.to_string());
    task.assigned_at = Some(now);
    Ok(())
}

/// Statuses a worker may pick up, split by whether a retry request is required.
pub(crate) fn dispatchable_statuses(
    regenerate_after_review: bool,
) -> (Vec<ExamStatus>, Vec<ExamStatus>) {
    let always = ExamStatus::ALL
        .into_iter()
        .filter(|status| {
            state_machine::next_step(*status, false, regenerate_after_review).is_some()
        })
        .collect::<Vec<_>>();
    let on_retry = ExamStatus::ALL
        .into_iter()
        .filter(|status| !always.contains(status))
        .filter(|status| state_machine::next_step(*status, true, regenerate_after_review).is_some())
        .collect();
    (always, on_retry)
}

#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn insert_exam(&self, exam: &ExamRow) -> Result<(), StoreError>;

    async fn find_exam(&self, exam_id: &str) -> Result<Option<ExamRow>, StoreError>;

    async fn list_exams(&self, user_id: &str, limit: i64) -> Result<Vec<ExamRow>, StoreError>;

    async fn transition(&self, change: ExamTransition) -> Result<ExamRow, StoreError>;

    async fn soft_delete(
        &self,
        exam_id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamRow>, StoreError>;

    async fn request_retry(
        &self,
        exam_id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ExamRow, StoreError>;

    /// Leases one idle exam with pending pipeline work.
    async fn claim_next(
        &self,
        now: PrimitiveDateTime,
        lease_until: PrimitiveDateTime,
        regenerate_after_review: bool,
    ) -> Result<Option<String>, StoreError>;

    async fn release_lease(&self, exam_id: &str) -> Result<(), StoreError>;

    async fn list_stale(
        &self,
        started_before: PrimitiveDateTime,
    ) -> Result<Vec<ExamRow>, StoreError>;
}

#[async_trait]
pub(crate) trait ReviewStore: Send + Sync {
    async fn find_task(&self, task_id: &str) -> Result<Option<ReviewTaskRow>, StoreError>;

    async fn list_open_tasks(
        &self,
        assignee: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ReviewTaskRow>, StoreError>;

    async fn list_tasks(&self) -> Result<Vec<ReviewTaskRow>, StoreError>;

    async fn reviewer_loads(&self) -> Result<Vec<ReviewerLoad>, StoreError>;

    async fn assign_task(
        &self,
        task_id: &str,
        reviewer_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ReviewTaskRow, StoreError>;

    async fn commit_review(
        &self,
        commit: ReviewCommit,
    ) -> Result<(ExamRow, ReviewTaskRow), StoreError>;
}
