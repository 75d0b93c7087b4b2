use anyhow::{Context, Result};
use time::PrimitiveDateTime;

use crate::core::metrics::STALE_RECOVERED;
use crate::core::time::shift_back;
use crate::repositories::store::{ExamStore, ExamTransition, StoreError};
use crate::tasks::pipeline::budget::StageLimits;
use crate::tasks::pipeline::state_machine::Stage;

/// Fails exams whose in-progress stage outlived its lease, e.g. after a worker crash.
pub(crate) async fn recover_stale_stages(
    exams: &dyn ExamStore,
    limits: StageLimits,
    now: PrimitiveDateTime,
) -> Result<usize> {
    let started_before = shift_back(now, limits.lease());
    let stale = exams.list_stale(started_before).await.context("Failed to list stale exams")?;

    let mut recovered = 0;
    for exam in stale {
        let Some(stage) = Stage::for_in_progress(exam.status) else {
            continue;
        };

        let message = format!("{stage} stage did not finish within {}s", limits.hard.as_secs());
        let change =
            ExamTransition::new(&exam.id, exam.status, stage.failure(), now).with_error(message);
        match exams.transition(change).await {
            Ok(failed) => {
                recovered += 1;
                tracing::warn!(
                    exam_id = %failed.id,
                    stage = %stage,
                    status = %failed.status,
                    "Recovered stale stage"
                );
                if let Err(err) = exams.release_lease(&failed.id).await {
                    tracing::warn!(
                        exam_id = %failed.id,
                        error = %err,
                        "Failed to release lease of stale exam"
                    );
                }
            }
            Err(err @ StoreError::StatusMismatch { .. }) => {
                tracing::debug!(
                    exam_id = %exam.id,
                    error = %err,
                    "Stale exam moved on before recovery"
                );
            }
            Err(err) => return Err(err).context("Failed to fail stale exam"),
        }
    }

    if recovered > 0 {
        metrics::counter!(STALE_RECOVERED).increment(recovered as u64);
    }
    Ok(recovered)
}
