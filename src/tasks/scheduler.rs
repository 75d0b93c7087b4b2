use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, shift};
use crate::repositories::store::ExamStore;
use crate::tasks::maintenance;
use crate::tasks::pipeline::{Collaborators, PipelineOrchestrator};

pub(crate) async fn run(state: AppState) -> Result<()> {
    let pipeline = state.settings().pipeline().clone();
    let collaborators = Collaborators::from_state(&state)?;
    let orchestrator =
        PipelineOrchestrator::from_settings(state.exams().clone(), collaborators, &pipeline)?;
    let orchestrator = Arc::new(orchestrator);
    let (_shutdown_tx, shutdown_rx) = crate::core::shutdown::shutdown_channel();

    let poll = Duration::from_millis(pipeline.poll_interval_ms.max(10));
    let mut handles = Vec::with_capacity(pipeline.worker_concurrency + 1);
    for worker_id in 0..pipeline.worker_concurrency {
        handles.push(tokio::spawn(pipeline_worker(
            worker_id,
            state.exams().clone(),
            orchestrator.clone(),
            poll,
            shutdown_rx.clone(),
        )));
    }
    handles.push(tokio::spawn(maintenance_loop(
        state.exams().clone(),
        orchestrator.clone(),
        Duration::from_secs(pipeline.maintenance_interval_seconds.max(1)),
        shutdown_rx.clone(),
    )));

    tracing::info!(
        workers = pipeline.worker_concurrency,
        hard_limit_seconds = pipeline.stage_hard_limit_seconds,
        soft_limit_seconds = pipeline.stage_soft_limit_seconds,
        regenerate_after_review = pipeline.regenerate_after_review,
        "Pipeline worker started"
    );

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

/// Claims one exam at a time, runs its next step and hands it back.
async fn pipeline_worker(
    worker_id: usize,
    exams: Arc<dyn ExamStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    poll: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = primitive_now_utc();
        let lease_until = shift(now, orchestrator.limits().lease());
        match exams.claim_next(now, lease_until, orchestrator.regenerate_after_review()).await {
            Ok(Some(exam_id)) => {
                if let Err(err) = orchestrator.step(&exam_id).await {
                    tracing::error!(
                        worker_id,
                        exam_id = %exam_id,
                        error = %err,
                        "Pipeline step failed"
                    );
                }
                if let Err(err) = exams.release_lease(&exam_id).await {
                    tracing::error!(
                        worker_id,
                        exam_id = %exam_id,
                        error = %err,
                        "Failed to release exam lease"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(worker_id, error = %err, "Failed to claim exam"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll) => {}
        }
    }
    tracing::info!(worker_id, "Pipeline worker stopped");
}

async fn maintenance_loop(
    exams: Arc<dyn ExamStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(every);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let limits = orchestrator.limits();
                match maintenance::recover_stale_stages(exams.as_ref(), limits, primitive_now_utc())
                    .await
                {
                    Ok(0) => {}
                    Ok(recovered) => tracing::info!(recovered, "Stale stage recovery finished"),
                    Err(err) => tracing::error!(error = %err, "recover_stale_stages failed"),
                }
            }
        }
    }
}
