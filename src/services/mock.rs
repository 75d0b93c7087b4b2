//! Deterministic in-process collaborators for local runs (`USE_MOCK_SERVICES`).

use async_trait::async_trait;

use crate::db::types::{ErrorReason, TextType};
use crate::schemas::diagnostic::{CapabilityDimensions, DiagnosisDraft, Issue, IssueSeverity};
use crate::schemas::ocr::{BoundingBox, TextRegion};
use crate::schemas::parser::Question;
use crate::services::answer_evaluation::SubjectiveScore;
use crate::services::collaborators::{
    DiagnosisGenerator, ImageSource, KnowledgeEnrichment, KnowledgeTagger, OcrProvider,
    RenderRequest, ReportRenderer, SubjectiveRequest, SubjectiveScorer,
};
use crate::services::diagnosis::ExamSummary;

const TAG_KEYWORDS: &[(&str, &str)] = &[
    ("函数", "函数"),
    ("方程", "方程"),
    ("几何", "几何"),
    ("概率", "概率统计"),
    ("证明", "逻辑推理"),
    ("计算", "运算能力"),
];

pub(crate) struct MockImageSource;

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch_image(&self, image_key: &str) -> anyhow::Result<Vec<u8>> {
        Ok(image_key.as_bytes().to_vec())
    }
}

/// Returns the same two-question paper for every image.
pub(crate) struct MockOcrProvider;

fn region(
    text: &str,
    (x, y, width, height): (i32, i32, i32, i32),
    confidence: f64,
    text_type: TextType,
) -> TextRegion {
    TextRegion {
        text: text.to_string(),
        bbox: BoundingBox { x, y, width, height },
        confidence,
        text_type,
    }
}

pub(crate) fn sample_regions() -> Vec<TextRegion> {
    vec![
        region("2024年11月5日 高一 数学 期中考试 满分100分", (40, 10, 600, 30), 0.98, TextType::Printed),
        region(
            "1. 下列函数中为增函数的是 (5分) A. y=-x B. y=x² C. y=2x D. y=1/x",
            (40, 60, 600, 30),
            0.96,
            TextType::Printed,
        ),
        region("C", (60, 100, 20, 20), 0.91, TextType::Handwritten),
        region("2. 证明: 函数 f(x)=x³ 在 R 上单调递增 (10分)", (40, 200, 600, 30), 0.95, TextType::Printed),
        region(
            "设 x1<x2, 则 f(x2)-f(x1)=(x2-x1)(x2²+x1x2+x1²)>0",
            (50, 240, 500, 40),
            0.72,
            TextType::Handwritten,
        ),
    ]
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextRegion>> {
        Ok(sample_regions())
    }
}

pub(crate) struct MockKnowledgeTagger;

#[async_trait]
impl KnowledgeTagger for MockKnowledgeTagger {
    async fn enrich(
        &self,
        question: &Question,
        subject: Option<&str>,
    ) -> anyhow::Result<KnowledgeEnrichment> {
        let mut knowledge_tags: Vec<String> = TAG_KEYWORDS
            .iter()
            .filter(|(keyword, _)| question.question_text.contains(keyword))
            .map(|(_, tag)| tag.to_string())
            .collect();
        knowledge_tags.dedup();
        if knowledge_tags.is_empty() {
            knowledge_tags.push(subject.map_or_else(|| "基础知识".to_string(), |s| format!("{s}基础")));
        }

        let difficulty = (0.3 + 0.1 * knowledge_tags.len() as f64).min(0.9);
        Ok(KnowledgeEnrichment { knowledge_tags, difficulty: Some(difficulty) })
    }
}

/// Scores by answer length relative to the reference, or to 40 characters without one.
pub(crate) struct MockSubjectiveScorer;

#[async_trait]
impl SubjectiveScorer for MockSubjectiveScorer {
    async fn evaluate(&self, request: SubjectiveRequest<'_>) -> SubjectiveScore {
        let expected = request.correct_answer.map_or(40, |answer| answer.chars().count().max(1));
        let ratio = (request.student_answer.chars().count() as f64 / expected as f64).min(1.0);
        SubjectiveScore {
            score_ratio: ratio,
            is_correct: ratio >= 0.6,
            rationale: format!("length ratio {ratio:.2}"),
            evaluation_failed: false,
        }
    }
}

pub(crate) struct MockDiagnosisGenerator;

#[async_trait]
impl DiagnosisGenerator for MockDiagnosisGenerator {
    async fn diagnose(&self, summary: &ExamSummary) -> anyhow::Result<DiagnosisDraft> {
        let stats = &summary.overall_stats;
        let overall = if stats.total_questions == 0 {
            0.5
        } else {
            stats.correct_count as f64 / stats.total_questions as f64
        };

        let mut surface_issues = Vec::new();
        let mut deep_issues = Vec::new();
        for reason in [ErrorReason::Careless, ErrorReason::Incomplete, ErrorReason::KnowledgeGap] {
            let evidence: Vec<String> = summary
                .questions
                .iter()
                .filter(|q| q.is_correct != Some(true) && q.error_reason == Some(reason))
                .map(|q| q.question_id.clone())
                .collect();
            if evidence.is_empty() {
                continue;
            }
            let issue = Issue {
                issue: format!("{reason:?} errors"),
                severity: if evidence.len() > 1 {
                    IssueSeverity::High
                } else {
                    IssueSeverity::Medium
                },
                evidence,
                ai_addressable: reason != ErrorReason::KnowledgeGap,
                consequence: None,
                root_cause: (reason == ErrorReason::KnowledgeGap)
                    .then(|| "missing prerequisite".to_string()),
            };
            if reason == ErrorReason::KnowledgeGap {
                deep_issues.push(issue);
            } else {
                surface_issues.push(issue);
            }
        }

        Ok(DiagnosisDraft {
            capability_dimensions: CapabilityDimensions {
                comprehension: overall,
                application: stats.objective_accuracy,
                analysis: stats.subjective_accuracy,
                synthesis: (overall + stats.subjective_accuracy) / 2.0,
                evaluation: overall,
            },
            surface_issues,
            deep_issues,
        })
    }
}

pub(crate) struct MockReportRenderer;

#[async_trait]
impl ReportRenderer for MockReportRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> anyhow::Result<Vec<String>> {
        Ok(vec![format!("mock://reports/{}/report.json", request.exam_id)])
    }
}
