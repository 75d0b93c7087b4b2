use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const EXAM_UPLOADS: &str = "exam_uploads_total";
pub(crate) const STAGE_TOTAL: &str = "pipeline_stage_total";
pub(crate) const STAGE_DURATION: &str = "pipeline_stage_duration_seconds";
pub(crate) const REVIEW_TASKS_CREATED: &str = "review_tasks_created_total";
pub(crate) const REVIEW_SUBMISSIONS: &str = "review_submissions_total";
pub(crate) const STALE_RECOVERED: &str = "pipeline_stale_recovered_total";
pub(crate) const COLLABORATOR_RETRIES: &str = "collaborator_retries_total";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!(EXAM_UPLOADS, "Exam images accepted for processing");
    describe_counter!(STAGE_TOTAL, "Pipeline stage runs by stage and outcome");
    describe_histogram!(STAGE_DURATION, Unit::Seconds, "Wall-clock time of one stage run");
    describe_counter!(REVIEW_TASKS_CREATED, "Review tasks opened by the analysis stage");
    describe_counter!(REVIEW_SUBMISSIONS, "Teacher corrections by outcome");
    describe_counter!(STALE_RECOVERED, "In-progress exams failed by stale-stage recovery");
    describe_counter!(COLLABORATOR_RETRIES, "Collaborator calls retried after an error");
}
