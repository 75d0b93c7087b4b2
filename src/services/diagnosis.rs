use serde::Serialize;

use crate::db::types::{ErrorReason, QuestionType, ReviewStatus};
use crate::schemas::analysis::{AnalysisResult, OverallStats};
use crate::schemas::diagnostic::{
    CapabilityDimensions, DiagnosisDraft, DiagnosticReport, Issue, IssueSeverity,
};
use crate::schemas::parser::{ExamMeta, ParsedExam};

/// What the diagnosis generator gets to see about one exam.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExamSummary {
    pub(crate) exam_id: String,
    pub(crate) exam_meta: ExamMeta,
    pub(crate) overall_stats: OverallStats,
    pub(crate) questions: Vec<QuestionDigest>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct QuestionDigest {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) knowledge_tags: Vec<String>,
    pub(crate) difficulty: Option<f64>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) error_reason: Option<ErrorReason>,
    pub(crate) review_status: ReviewStatus,
    pub(crate) confidence: f64,
}

impl ExamSummary {
    pub(crate) fn build(exam_id: &str, parsed: &ParsedExam, analysis: &AnalysisResult) -> Self {
        let questions = analysis
            .question_analysis
            .iter()
            .map(|qa| {
                let question = parsed.questions.iter().find(|q| q.question_id == qa.question_id);
                QuestionDigest {
                    question_id: qa.question_id.clone(),
                    question_type: qa.question_type,
                    knowledge_tags: question.map(|q| q.knowledge_tags.clone()).unwrap_or_default(),
                    difficulty: question.and_then(|q| q.difficulty),
                    is_correct: qa.is_correct,
                    error_reason: qa.error_reason,
                    review_status: qa.review_status,
                    confidence: qa.confidence,
                }
            })
            .collect();

        Self {
            exam_id: exam_id.to_string(),
            exam_meta: parsed.exam_meta.clone(),
            overall_stats: analysis.overall_stats.clone(),
            questions,
        }
    }
}

/// Stamps a generator draft with the analysis revision it was built from.
/// Out-of-range scores are clamped and issues without evidence flag the report.
pub(crate) fn finalize_report(draft: DiagnosisDraft, analysis_revision: i64) -> DiagnosticReport {
    let dims = draft.capability_dimensions;
    let capability_dimensions = CapabilityDimensions {
        comprehension: unit(dims.comprehension),
        application: unit(dims.application),
        analysis: unit(dims.analysis),
        synthesis: unit(dims.synthesis),
        evaluation: unit(dims.evaluation),
    };

    let mut report = DiagnosticReport {
        capability_dimensions,
        surface_issues: draft.surface_issues,
        deep_issues: draft.deep_issues,
        requires_manual_review: false,
        analysis_revision,
    };
    let flagged = report.issues().any(|issue| issue.evidence.is_empty());
    report.requires_manual_review = flagged;
    report
}

/// Substitute used when the generator gives up.
pub(crate) fn default_report(analysis_revision: i64) -> DiagnosticReport {
    DiagnosticReport {
        capability_dimensions: CapabilityDimensions::neutral(),
        surface_issues: vec![Issue {
            issue: "automatic diagnosis unavailable".to_string(),
            severity: IssueSeverity::High,
            evidence: vec!["system error".to_string()],
            ai_addressable: false,
            consequence: Some("needs manual review".to_string()),
            root_cause: None,
        }],
        deep_issues: Vec::new(),
        requires_manual_review: true,
        analysis_revision,
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
