use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::metrics::REVIEW_TASKS_CREATED;
use crate::db::models::{ExamRow, ReviewTaskRow};
use crate::db::types::ExamStatus;
use crate::repositories::store::{
    apply_assignment, apply_retry_request, apply_review, apply_soft_delete, apply_transition,
    dispatchable_statuses, ExamStore, ExamTransition, ReviewCommit, ReviewStore, StoreError,
};
use crate::repositories::{exams, review_tasks, reviewers};
use crate::services::review_routing::ReviewerLoad;

#[async_trait]
impl ExamStore for PgPool {
    async fn insert_exam(&self, exam: &ExamRow) -> Result<(), StoreError> {
        exams::insert(self, exam).await?;
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<ExamRow>, StoreError> {
        Ok(exams::find_by_id(self, exam_id).await?)
    }

    async fn list_exams(&self, user_id: &str, limit: i64) -> Result<Vec<ExamRow>, StoreError> {
        Ok(exams::list_by_user(self, user_id, limit).await?)
    }

    async fn transition(&self, change: ExamTransition) -> Result<ExamRow, StoreError> {
        let mut tx = self.begin().await?;

        let Some(mut exam) = exams::lock_by_id(&mut *tx, &change.exam_id).await? else {
            return Err(StoreError::ExamNotFound(change.exam_id));
        };

        let replacement = apply_transition(&mut exam, &change)?;
        if let Some(tasks) = replacement {
            let cancelled =
                review_tasks::cancel_open_for_exam(&mut *tx, &exam.id, change.now).await?;
            for task in &tasks {
                review_tasks::insert(&mut *tx, &exam.id, task, change.now).await?;
            }
            if cancelled > 0 {
                tracing::info!(exam_id = %exam.id, cancelled, "Superseded open review tasks");
            }
            metrics::counter!(REVIEW_TASKS_CREATED).increment(tasks.len() as u64);
        }
        exams::write(&mut *tx, &exam).await?;

        tx.commit().await?;
        Ok(exam)
    }

    async fn soft_delete(
        &self,
        exam_id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamRow>, StoreError> {
        let mut tx = self.begin().await?;

        let Some(mut exam) = exams::lock_by_id(&mut *tx, exam_id).await? else {
            return Ok(None);
        };
        if exam.user_id != user_id {
            return Ok(None);
        }

        if apply_soft_delete(&mut exam, now) {
            review_tasks::cancel_open_for_exam(&mut *tx, &exam.id, now).await?;
            exams::write(&mut *tx, &exam).await?;
        }

        tx.commit().await?;
        Ok(Some(exam))
    }

    async fn request_retry(
        &self,
        exam_id: &str,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ExamRow, StoreError> {
        let mut tx = self.begin().await?;

        let exam = exams::lock_by_id(&mut *tx, exam_id).await?;
        let Some(mut exam) = exam.filter(|exam| exam.user_id == user_id) else {
            return Err(StoreError::ExamNotFound(exam_id.to_string()));
        };

        apply_retry_request(&mut exam, now)?;
        exams::write(&mut *tx, &exam).await?;

        tx.commit().await?;
        Ok(exam)
    }

    async fn claim_next(
        &self,
        now: PrimitiveDateTime,
        lease_until: PrimitiveDateTime,
        regenerate_after_review: bool,
    ) -> Result<Option<String>, StoreError> {
        let (always, on_retry) = dispatchable_statuses(regenerate_after_review);
        Ok(exams::claim_next(self, now, lease_until, &always, &on_retry).await?)
    }

    async fn release_lease(&self, exam_id: &str) -> Result<(), StoreError> {
        exams::release_lease(self, exam_id).await?;
        Ok(())
    }

    async fn list_stale(
        &self,
        started_before: PrimitiveDateTime,
    ) -> Result<Vec<ExamRow>, StoreError> {
        let in_progress = ExamStatus::ALL
            .into_iter()
            .filter(|status| status.is_in_progress())
            .collect::<Vec<_>>();
        Ok(exams::list_stale(self, &in_progress, started_before).await?)
    }
}

#[async_trait]
impl ReviewStore for PgPool {
    async fn find_task(&self, task_id: &str) -> Result<Option<ReviewTaskRow>, StoreError> {
        Ok(review_tasks::find_by_id(self, task_id).await?)
    }

    async fn list_open_tasks(
        &self,
        assignee: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ReviewTaskRow>, StoreError> {
        Ok(review_tasks::list_open(self, assignee, limit).await?)
    }

    async fn list_tasks(&self) -> Result<Vec<ReviewTaskRow>, StoreError> {
        Ok(review_tasks::list_all(self).await?)
    }

    async fn reviewer_loads(&self) -> Result<Vec<ReviewerLoad>, StoreError> {
        Ok(reviewers::list_loads(self).await?)
    }

    async fn assign_task(
        &self,
        task_id: &str,
        reviewer_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ReviewTaskRow, StoreError> {
        let mut tx = self.begin().await?;

        let Some(mut task) = review_tasks::lock_by_id(&mut *tx, task_id).await? else {
            return Err(StoreError::TaskNotFound(task_id.to_string()));
        };
        apply_assignment(&mut task, reviewer_id, now)?;
        review_tasks::write(&mut *tx, &task).await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn commit_review(
        &self,
        commit: ReviewCommit,
    ) -> Result<(ExamRow, ReviewTaskRow), StoreError> {
        let mut tx = self.begin().await?;

        // Exam before task, the order soft delete and analysis commits use.
        let Some(mut exam) = exams::lock_by_id(&mut *tx, &commit.exam_id).await? else {
            return Err(StoreError::ExamNotFound(commit.exam_id));
        };
        let Some(mut task) = review_tasks::lock_by_id(&mut *tx, &commit.task_id).await? else {
            return Err(StoreError::TaskNotFound(commit.task_id));
        };
        if task.exam_id != exam.id {
            return Err(StoreError::TaskNotFound(commit.task_id));
        }

        apply_review(&mut exam, &mut task, &commit)?;
        exams::write(&mut *tx, &exam).await?;
        review_tasks::write(&mut *tx, &task).await?;

        tx.commit().await?;
        Ok((exam, task))
    }
}
