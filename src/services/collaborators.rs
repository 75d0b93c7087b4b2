//! Seams to everything outside the pipeline core. Production wiring lives in
//! `ai_collaborators`, `ocr_client` and `storage`; `mock` provides deterministic stand-ins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::schemas::diagnostic::{DiagnosisDraft, DiagnosticReport};
use crate::schemas::analysis::OverallStats;
use crate::schemas::ocr::TextRegion;
use crate::schemas::parser::{ExamMeta, Question};
use crate::services::answer_evaluation::SubjectiveScore;
use crate::services::diagnosis::ExamSummary;

#[async_trait]
pub(crate) trait ImageSource: Send + Sync {
    async fn fetch_image(&self, image_key: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
pub(crate) trait OcrProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image: &[u8]) -> anyhow::Result<Vec<TextRegion>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct KnowledgeEnrichment {
    #[serde(default)]
    pub(crate) knowledge_tags: Vec<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<f64>,
}

#[async_trait]
pub(crate) trait KnowledgeTagger: Send + Sync {
    async fn enrich(
        &self,
        question: &Question,
        subject: Option<&str>,
    ) -> anyhow::Result<KnowledgeEnrichment>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SubjectiveRequest<'a> {
    pub(crate) question_text: &'a str,
    pub(crate) student_answer: &'a str,
    pub(crate) correct_answer: Option<&'a str>,
    pub(crate) max_score: Option<f64>,
}

/// Never fails: implementations fold their own errors into a fallback verdict.
#[async_trait]
pub(crate) trait SubjectiveScorer: Send + Sync {
    async fn evaluate(&self, request: SubjectiveRequest<'_>) -> SubjectiveScore;
}

#[async_trait]
pub(crate) trait DiagnosisGenerator: Send + Sync {
    async fn diagnose(&self, summary: &ExamSummary) -> anyhow::Result<DiagnosisDraft>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderRequest<'a> {
    pub(crate) exam_id: &'a str,
    pub(crate) report: &'a DiagnosticReport,
    pub(crate) stats: &'a OverallStats,
    pub(crate) meta: &'a ExamMeta,
}

#[async_trait]
pub(crate) trait ReportRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest<'_>) -> anyhow::Result<Vec<String>>;
}
