use serde::{Deserialize, Serialize};

use crate::db::types::{ErrorReason, QuestionType, ReviewStatus};
use crate::schemas::ocr::BoundingBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerEvidence {
    pub(crate) answer_bbox: Option<BoundingBox>,
    pub(crate) ocr_confidence: f64,
    pub(crate) answer_clarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionAnalysis {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) student_answer: Option<String>,
    pub(crate) correct_answer: Option<String>,
    /// `None` means the verdict is unknown.
    pub(crate) is_correct: Option<bool>,
    pub(crate) confidence: f64,
    pub(crate) error_reason: Option<ErrorReason>,
    pub(crate) review_status: ReviewStatus,
    pub(crate) evidence: AnswerEvidence,
    pub(crate) score_obtained: Option<f64>,
    pub(crate) score_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct OverallStats {
    pub(crate) total_questions: usize,
    pub(crate) correct_count: usize,
    pub(crate) objective_accuracy: f64,
    pub(crate) subjective_accuracy: f64,
    pub(crate) pending_review_count: usize,
    pub(crate) total_score: Option<f64>,
    pub(crate) max_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnalysisResult {
    pub(crate) question_analysis: Vec<QuestionAnalysis>,
    pub(crate) overall_stats: OverallStats,
}

impl AnalysisResult {
    pub(crate) fn find(&self, question_id: &str) -> Option<&QuestionAnalysis> {
        self.question_analysis.iter().find(|analysis| analysis.question_id == question_id)
    }
}
