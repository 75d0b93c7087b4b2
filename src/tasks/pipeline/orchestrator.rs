use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use thiserror::Error;

use crate::core::config::PipelineSettings;
use crate::core::metrics::{STAGE_DURATION, STAGE_TOTAL};
use crate::core::time::primitive_now_utc;
use crate::db::models::ExamRow;
use crate::db::types::{ExamStatus, QuestionType};
use crate::repositories::store::{ExamStore, ExamTransition, StageOutput, StoreError};
use crate::schemas::analysis::AnalysisResult;
use crate::schemas::diagnostic::ReportArtifact;
use crate::schemas::ocr::OcrResult;
use crate::schemas::parser::{ParsedExam, Question};
use crate::services::answer_evaluation::{apply_subjective_score, evaluate_question};
use crate::services::answer_extraction::extract_answer;
use crate::services::collaborators::{RenderRequest, SubjectiveRequest};
use crate::services::diagnosis::{default_report, finalize_report, ExamSummary};
use crate::services::exam_parsing::StructuralParser;
use crate::services::overall_stats::compute_overall_stats;
use crate::services::review_routing::plan_review_tasks;
use crate::tasks::pipeline::budget::{StageDeadline, StageLimits};
use crate::tasks::pipeline::state_machine::{next_step, PipelineStep, Stage};
use crate::tasks::pipeline::wiring::Collaborators;

/// Upper bound on steps taken by [`PipelineOrchestrator::drive`].
const MAX_DRIVE_STEPS: usize = 16;

#[derive(Debug, Error)]
pub(crate) enum StageError {
    #[error("missing {0}")]
    MissingInput(&'static str),
    #[error("stage exceeded its hard limit of {}s", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("{0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl StageError {
    fn outcome(&self) -> &'static str {
        match self {
            StageError::MissingInput(_) => "invalid_input",
            StageError::TimedOut(_) => "timeout",
            StageError::Cancelled => "cancelled",
            StageError::Collaborator(_) => "failure",
        }
    }
}

/// Drives exams through the state machine one stage at a time.
pub(crate) struct PipelineOrchestrator {
    exams: Arc<dyn ExamStore>,
    collaborators: Collaborators,
    parser: StructuralParser,
    limits: StageLimits,
    cancel_poll: Duration,
    regenerate_after_review: bool,
}

impl PipelineOrchestrator {
    pub(crate) fn new(
        exams: Arc<dyn ExamStore>,
        collaborators: Collaborators,
        limits: StageLimits,
    ) -> anyhow::Result<Self> {
        let parser = StructuralParser::new().context("Failed to compile question patterns")?;
        Ok(Self {
            exams,
            collaborators,
            parser,
            limits,
            cancel_poll: Duration::from_secs(1),
            regenerate_after_review: true,
        })
    }

    pub(crate) fn from_settings(
        exams: Arc<dyn ExamStore>,
        collaborators: Collaborators,
        settings: &PipelineSettings,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(exams, collaborators, StageLimits::from_settings(settings))?
            .with_cancel_poll(Duration::from_millis(settings.cancel_poll_interval_ms))
            .with_regeneration(settings.regenerate_after_review))
    }

    pub(crate) fn with_cancel_poll(mut self, interval: Duration) -> Self {
        self.cancel_poll = interval.max(Duration::from_millis(1));
        self
    }

    pub(crate) fn with_regeneration(mut self, enabled: bool) -> Self {
        self.regenerate_after_review = enabled;
        self
    }

    pub(crate) fn limits(&self) -> StageLimits {
        self.limits
    }

    pub(crate) fn regenerate_after_review(&self) -> bool {
        self.regenerate_after_review
    }

    /// Runs the next legal step for an exam. `None` when there is nothing to do.
    pub(crate) async fn step(&self, exam_id: &str) -> Result<Option<ExamRow>, StoreError> {
        let Some(exam) = self.exams.find_exam(exam_id).await? else {
            return Err(StoreError::ExamNotFound(exam_id.to_string()));
        };
        if exam.is_deleted {
            return Ok(None);
        }

        match next_step(exam.status, exam.retry_requested, self.regenerate_after_review) {
            None => Ok(None),
            Some(PipelineStep::Complete) => {
                let change = ExamTransition::new(
                    &exam.id,
                    ExamStatus::ReportGenerated,
                    ExamStatus::Completed,
                    primitive_now_utc(),
                );
                let exam = self.exams.transition(change).await?;
                tracing::info!(exam_id = %exam.id, "Exam pipeline completed");
                Ok(Some(exam))
            }
            Some(PipelineStep::Run(stage)) => self.run_stage(&exam, stage).await.map(Some),
        }
    }

    /// Steps an exam until it goes idle. Returns the last persisted row.
    pub(crate) async fn drive(&self, exam_id: &str) -> Result<ExamRow, StoreError> {
        for _ in 0..MAX_DRIVE_STEPS {
            if self.step(exam_id).await?.is_none() {
                break;
            }
        }
        self.exams
            .find_exam(exam_id)
            .await?
            .ok_or_else(|| StoreError::ExamNotFound(exam_id.to_string()))
    }

    /// Enters `stage`, runs it under the stage limits and commits the outcome.
    pub(crate) async fn run_stage(
        &self,
        exam: &ExamRow,
        stage: Stage,
    ) -> Result<ExamRow, StoreError> {
        let now = primitive_now_utc();
        let enter = ExamTransition::new(&exam.id, exam.status, stage.in_progress(), now);
        let entered = self.exams.transition(enter).await?;
        tracing::info!(
            exam_id = %entered.id,
            stage = %stage,
            revision = entered.revision,
            "Stage started"
        );

        let started = Instant::now();
        let deadline = self.limits.start();
        let hard = self.limits.hard;
        let outcome = tokio::select! {
            result = tokio::time::timeout(hard, self.execute(stage, &entered, deadline)) => {
                result.unwrap_or(Err(StageError::TimedOut(hard)))
            }
            _ = self.wait_for_deletion(&entered.id) => Err(StageError::Cancelled),
        };

        let result = match outcome {
            Ok((output, expected_revision)) => {
                self.commit_success(&entered, stage, output, expected_revision).await
            }
            Err(err) => self.commit_failure(&entered, stage, err).await,
        };
        metrics::histogram!(STAGE_DURATION, "stage" => stage.name())
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn commit_success(
        &self,
        exam: &ExamRow,
        stage: Stage,
        output: StageOutput,
        expected_revision: Option<i64>,
    ) -> Result<ExamRow, StoreError> {
        let now = primitive_now_utc();
        let mut change =
            ExamTransition::new(&exam.id, stage.in_progress(), stage.success(), now)
                .with_output(output);
        if let Some(revision) = expected_revision {
            change = change.with_revision(revision);
        }

        match self.exams.transition(change).await {
            Ok(committed) => {
                metrics::counter!(STAGE_TOTAL, "stage" => stage.name(), "outcome" => "success")
                    .increment(1);
                tracing::info!(
                    exam_id = %committed.id,
                    stage = %stage,
                    status = %committed.status,
                    "Stage committed"
                );
                Ok(committed)
            }
            Err(StoreError::RevisionMismatch { expected, current }) => {
                metrics::counter!(STAGE_TOTAL, "stage" => stage.name(), "outcome" => "stale")
                    .increment(1);
                tracing::warn!(
                    exam_id = %exam.id,
                    stage = %stage,
                    expected,
                    current,
                    "Analysis changed during stage; discarding stale output"
                );
                let change =
                    ExamTransition::new(&exam.id, stage.in_progress(), ExamStatus::Reviewed, now);
                self.exams.transition(change).await
            }
            Err(StoreError::Deleted) => {
                self.commit_failure(exam, stage, StageError::Cancelled).await
            }
            Err(err) => Err(err),
        }
    }

    async fn commit_failure(
        &self,
        exam: &ExamRow,
        stage: Stage,
        err: StageError,
    ) -> Result<ExamRow, StoreError> {
        metrics::counter!(STAGE_TOTAL, "stage" => stage.name(), "outcome" => err.outcome())
            .increment(1);
        let message = err.to_string();
        tracing::error!(exam_id = %exam.id, stage = %stage, error = %message, "Stage failed");

        let now = primitive_now_utc();
        let change =
            ExamTransition::new(&exam.id, stage.in_progress(), stage.failure(), now)
                .with_error(message);
        self.exams.transition(change).await
    }

    async fn wait_for_deletion(&self, exam_id: &str) {
        loop {
            tokio::time::sleep(self.cancel_poll).await;
            match self.exams.find_exam(exam_id).await {
                Ok(Some(exam)) if !exam.is_deleted => {}
                Ok(_) => {
                    tracing::info!(exam_id, "Exam deleted during stage; cancelling");
                    return;
                }
                Err(err) => tracing::warn!(exam_id, error = %err, "Cancellation poll failed"),
            }
        }
    }

    /// Stage computation. Returns the output and the revision its commit must match.
    async fn execute(
        &self,
        stage: Stage,
        exam: &ExamRow,
        deadline: StageDeadline,
    ) -> Result<(StageOutput, Option<i64>), StageError> {
        match stage {
            Stage::Ocr => Ok((self.recognize(exam).await?, None)),
            Stage::Parse => Ok((self.parse(exam, deadline).await?, None)),
            Stage::Analyze => Ok((self.analyze(exam, deadline).await?, None)),
            Stage::Diagnose => Ok((self.diagnose(exam).await?, Some(exam.revision))),
            Stage::Report => {
                let (output, revision) = self.render(exam).await?;
                Ok((output, Some(revision)))
            }
        }
    }

    async fn recognize(&self, exam: &ExamRow) -> Result<StageOutput, StageError> {
        let image = self
            .collaborators
            .images
            .fetch_image(&exam.image_key)
            .await
            .with_context(|| format!("failed to fetch image {}", exam.image_key))?;

        let started = Instant::now();
        let regions = self.collaborators.ocr.recognize(&image).await?;
        let elapsed = started.elapsed().as_secs_f64();
        let result = OcrResult::from_regions(self.collaborators.ocr.name(), regions, elapsed);

        tracing::info!(
            exam_id = %exam.id,
            regions = result.text_regions.len(),
            low_confidence = result.low_confidence_regions.len(),
            overall_confidence = result.overall_confidence,
            "OCR finished"
        );
        Ok(StageOutput::Ocr(result))
    }

    async fn parse(
        &self,
        exam: &ExamRow,
        deadline: StageDeadline,
    ) -> Result<StageOutput, StageError> {
        let ocr = exam.ocr_result.as_deref().ok_or(StageError::MissingInput("ocr_result"))?;
        let mut parsed = self.parser.parse(ocr);
        if parsed.exam_meta.subject.is_none() {
            parsed.exam_meta.subject = exam.subject.clone();
        }
        let subject = parsed.exam_meta.subject.clone();

        let mut enriched = 0;
        for question in parsed.questions.iter_mut() {
            if deadline.soft_expired() {
                tracing::warn!(
                    exam_id = %exam.id,
                    enriched,
                    "Soft limit reached; skipping remaining knowledge tagging"
                );
                break;
            }
            if self.enrich(exam, question, subject.as_deref()).await {
                enriched += 1;
            }
        }

        tracing::info!(
            exam_id = %exam.id,
            questions = parsed.questions.len(),
            enriched,
            parsing_confidence = parsed.parsing_confidence,
            "Parsing finished"
        );
        Ok(StageOutput::Parsed(parsed))
    }

    /// Tagging failures leave the question as parsed.
    async fn enrich(&self, exam: &ExamRow, question: &mut Question, subject: Option<&str>) -> bool {
        match self.collaborators.tagger.enrich(question, subject).await {
            Ok(enrichment) => {
                if !enrichment.knowledge_tags.is_empty() {
                    question.knowledge_tags = enrichment.knowledge_tags;
                }
                if let Some(difficulty) = enrichment.difficulty.filter(|value| value.is_finite()) {
                    question.difficulty = Some(difficulty.clamp(0.0, 1.0));
                }
                true
            }
            Err(err) => {
                tracing::warn!(
                    exam_id = %exam.id,
                    question_id = %question.question_id,
                    error = %format!("{err:#}"),
                    "Knowledge tagging failed; keeping question as parsed"
                );
                false
            }
        }
    }

    async fn analyze(
        &self,
        exam: &ExamRow,
        deadline: StageDeadline,
    ) -> Result<StageOutput, StageError> {
        let ocr = exam.ocr_result.as_deref().ok_or(StageError::MissingInput("ocr_result"))?;
        let parsed =
            exam.parsed_result.as_deref().ok_or(StageError::MissingInput("parsed_result"))?;

        let mut analyses = Vec::with_capacity(parsed.questions.len());
        for (idx, question) in parsed.questions.iter().enumerate() {
            let window_bottom = answer_window_bottom(parsed, idx);
            let extracted =
                extract_answer(question.bbox.as_ref(), &ocr.text_regions, window_bottom);
            let mut analysis = evaluate_question(question, extracted);

            if question.question_type == QuestionType::Subjective {
                if let Some(answer) = analysis.student_answer.clone() {
                    if deadline.soft_expired() {
                        tracing::warn!(
                            exam_id = %exam.id,
                            question_id = %question.question_id,
                            "Soft limit reached; leaving subjective verdict unknown"
                        );
                    } else {
                        let verdict = self
                            .collaborators
                            .scorer
                            .evaluate(SubjectiveRequest {
                                question_text: &question.question_text,
                                student_answer: &answer,
                                correct_answer: question.correct_answer.as_deref(),
                                max_score: question.score,
                            })
                            .await;
                        if !apply_subjective_score(question, &mut analysis, &verdict) {
                            tracing::warn!(
                                exam_id = %exam.id,
                                question_id = %question.question_id,
                                "Subjective scoring failed; verdict left unknown"
                            );
                        }
                    }
                }
            }
            analyses.push(analysis);
        }

        let overall_stats = compute_overall_stats(&analyses);
        let result = AnalysisResult { question_analysis: analyses, overall_stats };
        let review_tasks = plan_review_tasks(&result);

        tracing::info!(
            exam_id = %exam.id,
            questions = result.overall_stats.total_questions,
            correct = result.overall_stats.correct_count,
            pending_review = result.overall_stats.pending_review_count,
            review_tasks = review_tasks.len(),
            "Analysis finished"
        );
        Ok(StageOutput::Analysis { result, review_tasks })
    }

    async fn diagnose(&self, exam: &ExamRow) -> Result<StageOutput, StageError> {
        let (parsed, analysis) = analysis_inputs(exam)?;
        let summary = ExamSummary::build(&exam.id, parsed, analysis);

        let report = match self.collaborators.diagnosis.diagnose(&summary).await {
            Ok(draft) => finalize_report(draft, exam.revision),
            Err(err) => {
                tracing::error!(
                    exam_id = %exam.id,
                    error = %format!("{err:#}"),
                    "Diagnosis failed; substituting default report for manual review"
                );
                default_report(exam.revision)
            }
        };

        if report.requires_manual_review {
            tracing::warn!(exam_id = %exam.id, "Diagnostic report flagged for manual review");
        }
        Ok(StageOutput::Diagnosis(report))
    }

    async fn render(&self, exam: &ExamRow) -> Result<(StageOutput, i64), StageError> {
        let (parsed, analysis) = analysis_inputs(exam)?;
        let report = exam
            .diagnostic_report
            .as_deref()
            .ok_or(StageError::MissingInput("diagnostic_report"))?;

        let artifact_refs = self
            .collaborators
            .renderer
            .render(RenderRequest {
                exam_id: &exam.id,
                report,
                stats: &analysis.overall_stats,
                meta: &parsed.exam_meta,
            })
            .await?;
        if artifact_refs.is_empty() {
            return Err(StageError::Collaborator(anyhow!("report renderer returned no artifacts")));
        }

        tracing::info!(exam_id = %exam.id, artifacts = artifact_refs.len(), "Report rendered");
        let artifact =
            ReportArtifact { artifact_refs, analysis_revision: report.analysis_revision };
        Ok((StageOutput::Report(artifact), report.analysis_revision))
    }
}

fn analysis_inputs(exam: &ExamRow) -> Result<(&ParsedExam, &AnalysisResult), StageError> {
    let parsed = exam.parsed_result.as_deref().ok_or(StageError::MissingInput("parsed_result"))?;
    let analysis =
        exam.analysis_result.as_deref().ok_or(StageError::MissingInput("analysis_result"))?;
    Ok((parsed, analysis))
}

/// Top edge of the next question box below question `idx`, if any.
fn answer_window_bottom(parsed: &ParsedExam, idx: usize) -> Option<i32> {
    let current = parsed.questions.get(idx)?.bbox?;
    parsed.questions[idx + 1..]
        .iter()
        .filter_map(|question| question.bbox)
        .map(|bbox| bbox.y)
        .find(|&top| top > current.bottom())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::ReviewStatus;
    use crate::schemas::diagnostic::DiagnosisDraft;
    use crate::schemas::ocr::{BoundingBox, TextRegion};
    use crate::schemas::parser::ExamMeta;
    use crate::services::answer_evaluation::SubjectiveScore;
    use crate::services::collaborators::{
        DiagnosisGenerator, KnowledgeEnrichment, KnowledgeTagger, OcrProvider, SubjectiveScorer,
    };
    use crate::services::mock::{sample_regions, MockDiagnosisGenerator};
    use crate::test_support::{self, MemoryStore, OWNER};

    fn bbox(y: i32) -> BoundingBox {
        BoundingBox { x: 0, y, width: 100, height: 20 }
    }

    #[test]
    fn answer_window_stops_at_next_question_below() {
        let parsed = ParsedExam {
            exam_meta: ExamMeta::default(),
            questions: vec![
                test_support::question("Q1", "1. first", Some(bbox(0))),
                test_support::question("Q2", "2. no box", None),
                test_support::question("Q3", "3. third", Some(bbox(120))),
            ],
            parsing_confidence: 1.0,
            incomplete_fields: Vec::new(),
        };

        assert_eq!(answer_window_bottom(&parsed, 0), Some(120));
        assert_eq!(answer_window_bottom(&parsed, 1), None);
        assert_eq!(answer_window_bottom(&parsed, 2), None);
    }

    #[test]
    fn stage_errors_render_for_error_message() {
        assert_eq!(StageError::MissingInput("ocr_result").to_string(), "missing ocr_result");
        assert_eq!(StageError::Cancelled.to_string(), "cancelled");
        let err =
            StageError::from(anyhow!("quota exceeded").context("ocr failed after 3 attempts"));
        assert_eq!(err.to_string(), "ocr failed after 3 attempts: quota exceeded");
    }

    /// Fails the first `failures` calls, then returns the sample paper.
    struct FlakyOcr {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrProvider for FlakyOcr {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextRegion>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                anyhow::bail!("ocr quota exceeded");
            }
            Ok(sample_regions())
        }
    }

    /// Deletes the exam it is working on, then stalls.
    struct DeletingOcr {
        store: Arc<MemoryStore>,
        exam_id: &'static str,
    }

    #[async_trait]
    impl OcrProvider for DeletingOcr {
        fn name(&self) -> &'static str {
            "deleting"
        }

        async fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextRegion>> {
            self.store.delete_exam(self.exam_id);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(sample_regions())
        }
    }

    struct StalledOcr;

    #[async_trait]
    impl OcrProvider for StalledOcr {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextRegion>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(sample_regions())
        }
    }

    struct FailingTagger;

    #[async_trait]
    impl KnowledgeTagger for FailingTagger {
        async fn enrich(
            &self,
            _question: &Question,
            _subject: Option<&str>,
        ) -> anyhow::Result<KnowledgeEnrichment> {
            anyhow::bail!("tagging model unavailable")
        }
    }

    struct FallbackScorer;

    #[async_trait]
    impl SubjectiveScorer for FallbackScorer {
        async fn evaluate(&self, _request: SubjectiveRequest<'_>) -> SubjectiveScore {
            SubjectiveScore {
                score_ratio: 0.5,
                is_correct: false,
                rationale: "scoring unavailable".to_string(),
                evaluation_failed: true,
            }
        }
    }

    struct FailingDiagnosis;

    #[async_trait]
    impl DiagnosisGenerator for FailingDiagnosis {
        async fn diagnose(&self, _summary: &ExamSummary) -> anyhow::Result<DiagnosisDraft> {
            anyhow::bail!("diagnosis model returned malformed json")
        }
    }

    /// Simulates a teacher correction landing while the diagnosis is in flight.
    struct CorrectedDuringDiagnosis {
        store: Arc<MemoryStore>,
        exam_id: &'static str,
    }

    #[async_trait]
    impl DiagnosisGenerator for CorrectedDuringDiagnosis {
        async fn diagnose(&self, summary: &ExamSummary) -> anyhow::Result<DiagnosisDraft> {
            self.store.bump_revision(self.exam_id);
            MockDiagnosisGenerator.diagnose(summary).await
        }
    }

    #[derive(Default)]
    struct CountingTagger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeTagger for CountingTagger {
        async fn enrich(
            &self,
            question: &Question,
            subject: Option<&str>,
        ) -> anyhow::Result<KnowledgeEnrichment> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            crate::services::mock::MockKnowledgeTagger.enrich(question, subject).await
        }
    }

    #[derive(Default)]
    struct CountingScorer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SubjectiveScorer for CountingScorer {
        async fn evaluate(&self, _request: SubjectiveRequest<'_>) -> SubjectiveScore {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SubjectiveScore {
                score_ratio: 1.0,
                is_correct: true,
                rationale: "complete proof".to_string(),
                evaluation_failed: false,
            }
        }
    }

    fn orchestrator(
        store: &Arc<MemoryStore>,
        collaborators: Collaborators,
        hard: Duration,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(store.clone(), collaborators, StageLimits::new(hard, hard))
            .expect("orchestrator")
            .with_cancel_poll(Duration::from_millis(10))
    }

    fn seeded_store(exam_id: &str) -> Arc<MemoryStore> {
        let store = MemoryStore::shared();
        store.insert_exam_row(test_support::uploaded_exam(exam_id));
        store
    }

    #[tokio::test]
    async fn mock_pipeline_runs_to_completion() {
        let store = seeded_store("exam-1");
        let orchestrator = orchestrator(&store, Collaborators::mock(), Duration::from_secs(30));

        let exam = orchestrator.drive("exam-1").await.expect("drive");

        assert_eq!(exam.status, ExamStatus::Completed);
        assert!(exam.completed_at.is_some());
        assert_eq!(exam.error_message, None);
        let ocr = exam.ocr_result.as_deref().expect("ocr result");
        assert_eq!(ocr.text_regions.len(), sample_regions().len());
        let parsed = exam.parsed_result.as_deref().expect("parsed result");
        assert!(!parsed.questions.is_empty());
        let analysis = exam.analysis_result.as_deref().expect("analysis");
        assert_eq!(analysis.question_analysis.len(), parsed.questions.len());
        assert_eq!(exam.revision, 1);
        let report = exam.diagnostic_report.as_deref().expect("report");
        assert_eq!(report.analysis_revision, exam.revision);
        let artifact = exam.report_artifact.as_deref().expect("artifact");
        assert!(!artifact.artifact_refs.is_empty());
        assert_eq!(artifact.analysis_revision, exam.revision);

        let pending = analysis
            .question_analysis
            .iter()
            .filter(|qa| qa.review_status == ReviewStatus::AiPendingReview)
            .count();
        assert_eq!(store.tasks_for("exam-1").len(), pending);
    }

    #[tokio::test]
    async fn failed_stage_waits_for_retry_request() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.ocr = Arc::new(FlakyOcr { failures: 1, calls: AtomicUsize::new(0) });
        let orchestrator = orchestrator(&store, collaborators, Duration::from_secs(30));

        let exam = orchestrator.drive("exam-1").await.expect("drive");
        assert_eq!(exam.status, ExamStatus::OcrFailed);
        assert_eq!(exam.error_message.as_deref(), Some("ocr quota exceeded"));
        assert!(orchestrator.step("exam-1").await.expect("step").is_none());

        store.request_retry("exam-1", OWNER, primitive_now_utc()).await.expect("retry");
        let exam = orchestrator.drive("exam-1").await.expect("drive");
        assert_eq!(exam.status, ExamStatus::Completed);
        assert_eq!(exam.error_message, None);
        assert!(!exam.retry_requested);
    }

    #[tokio::test]
    async fn deleting_an_exam_cancels_the_running_stage() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.ocr = Arc::new(DeletingOcr { store: store.clone(), exam_id: "exam-1" });
        let orchestrator = orchestrator(&store, collaborators, Duration::from_secs(30));

        let exam = orchestrator.step("exam-1").await.expect("step").expect("stage ran");
        assert_eq!(exam.status, ExamStatus::OcrFailed);
        assert_eq!(exam.error_message.as_deref(), Some("cancelled"));
        assert!(exam.is_deleted);
        assert!(exam.ocr_result.is_none());
        assert!(orchestrator.step("exam-1").await.expect("step").is_none());
    }

    #[tokio::test]
    async fn hard_limit_fails_the_stage() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.ocr = Arc::new(StalledOcr);
        let orchestrator = orchestrator(&store, collaborators, Duration::from_millis(50));

        let exam = orchestrator.step("exam-1").await.expect("step").expect("stage ran");
        assert_eq!(exam.status, ExamStatus::OcrFailed);
        let message = exam.error_message.as_deref().unwrap_or_default();
        assert!(message.contains("hard limit"), "{message}");
        assert_eq!(exam.stage_started_at, None);
    }

    #[tokio::test]
    async fn stale_diagnosis_is_discarded_for_reviewed() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.diagnosis =
            Arc::new(CorrectedDuringDiagnosis { store: store.clone(), exam_id: "exam-1" });
        let orchestrator =
            orchestrator(&store, collaborators, Duration::from_secs(30)).with_regeneration(false);

        let exam = orchestrator.drive("exam-1").await.expect("drive");
        assert_eq!(exam.status, ExamStatus::Reviewed);
        assert_eq!(exam.revision, 2);
        assert!(exam.diagnostic_report.is_none());
    }

    #[tokio::test]
    async fn diagnosis_failure_substitutes_default_report() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.diagnosis = Arc::new(FailingDiagnosis);
        let orchestrator = orchestrator(&store, collaborators, Duration::from_secs(30));

        let exam = orchestrator.drive("exam-1").await.expect("drive");
        assert_eq!(exam.status, ExamStatus::Completed);
        let report = exam.diagnostic_report.as_deref().expect("report");
        assert!(report.requires_manual_review);
        assert_eq!(report.surface_issues[0].issue, "automatic diagnosis unavailable");
    }

    #[tokio::test]
    async fn optional_calls_fail_per_question() {
        let store = seeded_store("exam-1");
        let mut collaborators = Collaborators::mock();
        collaborators.tagger = Arc::new(FailingTagger);
        collaborators.scorer = Arc::new(FallbackScorer);
        let orchestrator = orchestrator(&store, collaborators, Duration::from_secs(30));

        let exam = orchestrator.drive("exam-1").await.expect("drive");
        assert_eq!(exam.status, ExamStatus::Completed);

        let parsed = exam.parsed_result.as_deref().expect("parsed result");
        assert!(parsed.questions.iter().all(|question| question.difficulty.is_none()));
        let analysis = exam.analysis_result.as_deref().expect("analysis");
        let subjective = analysis
            .question_analysis
            .iter()
            .filter(|qa| qa.question_type == QuestionType::Subjective);
        for qa in subjective {
            assert_eq!(qa.is_correct, None, "{}", qa.question_id);
            assert_eq!(qa.review_status, ReviewStatus::AiPendingReview);
        }
    }

    #[tokio::test]
    async fn soft_limit_skips_optional_calls_but_commits() {
        let store = seeded_store("exam-1");
        let tagger = Arc::new(CountingTagger::default());
        let scorer = Arc::new(CountingScorer::default());
        let mut collaborators = Collaborators::mock();
        collaborators.tagger = tagger.clone();
        collaborators.scorer = scorer.clone();
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            collaborators,
            StageLimits::new(Duration::from_secs(30), Duration::ZERO),
        )
        .expect("orchestrator")
        .with_cancel_poll(Duration::from_millis(10));

        let exam = orchestrator.step("exam-1").await.expect("step").expect("ocr ran");
        assert_eq!(exam.status, ExamStatus::OcrCompleted);
        let exam = orchestrator.step("exam-1").await.expect("step").expect("parse ran");
        assert_eq!(exam.status, ExamStatus::Parsed);
        let exam = orchestrator.step("exam-1").await.expect("step").expect("analysis ran");
        assert_eq!(exam.status, ExamStatus::Analyzed);

        assert_eq!(tagger.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);

        let parsed = exam.parsed_result.as_deref().expect("parsed result");
        assert!(parsed.questions.iter().all(|question| question.difficulty.is_none()));
        let analysis = exam.analysis_result.as_deref().expect("analysis");
        let subjective: Vec<_> = analysis
            .question_analysis
            .iter()
            .filter(|qa| qa.question_type == QuestionType::Subjective)
            .collect();
        assert!(subjective.iter().any(|qa| qa.student_answer.is_some()));
        for qa in subjective {
            assert_eq!(qa.is_correct, None, "{}", qa.question_id);
        }
    }

    #[tokio::test]
    async fn missing_exam_is_reported() {
        let store = MemoryStore::shared();
        let orchestrator = orchestrator(&store, Collaborators::mock(), Duration::from_secs(30));
        let err = orchestrator.step("ghost").await.expect_err("missing");
        assert!(matches!(err, StoreError::ExamNotFound(id) if id == "ghost"));
    }
}
