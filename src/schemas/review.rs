use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::ReviewTaskRow;
use crate::db::types::{ErrorReason, ReviewPriority, ReviewTaskStatus};
use crate::schemas::analysis::QuestionAnalysis;

/// Snapshot of the automated judgment stored on a review task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AiJudgment {
    pub(crate) student_answer: Option<String>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) confidence: f64,
    pub(crate) error_reason: Option<ErrorReason>,
    pub(crate) score_obtained: Option<f64>,
    pub(crate) score_total: Option<f64>,
}

impl From<&QuestionAnalysis> for AiJudgment {
    fn from(analysis: &QuestionAnalysis) -> Self {
        Self {
            student_answer: analysis.student_answer.clone(),
            correct_answer: analysis.correct_answer.clone(),
            is_correct: analysis.is_correct,
            confidence: analysis.confidence,
            error_reason: analysis.error_reason,
            score_obtained: analysis.score_obtained,
            score_total: analysis.score_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct TeacherJudgment {
    pub(crate) is_correct: bool,
    #[serde(default)]
    pub(crate) error_reason: Option<ErrorReason>,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReviewSubmitRequest {
    #[validate(nested)]
    pub(crate) teacher_judgment: TeacherJudgment,
    #[serde(default)]
    #[validate(length(max = 4000, message = "comment is too long"))]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReviewAssignRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "reviewer_id must not be empty"))]
    pub(crate) reviewer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewQueueQuery {
    #[serde(default)]
    pub(crate) assignee: Option<String>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReviewTaskResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) question_id: String,
    pub(crate) priority: ReviewPriority,
    pub(crate) status: ReviewTaskStatus,
    pub(crate) assigned_to: Option<String>,
    pub(crate) ai_judgment: AiJudgment,
    pub(crate) teacher_judgment: Option<TeacherJudgment>,
    pub(crate) teacher_comment: Option<String>,
    pub(crate) created_at: String,
    pub(crate) assigned_at: Option<String>,
    pub(crate) completed_at: Option<String>,
}

impl From<ReviewTaskRow> for ReviewTaskResponse {
    fn from(task: ReviewTaskRow) -> Self {
        Self {
            id: task.id,
            exam_id: task.exam_id,
            question_id: task.question_id,
            priority: task.priority,
            status: task.status,
            assigned_to: task.assigned_to,
            ai_judgment: task.ai_judgment.0,
            teacher_judgment: task.teacher_judgment.map(|judgment| judgment.0),
            teacher_comment: task.teacher_comment,
            created_at: format_primitive(task.created_at),
            assigned_at: task.assigned_at.map(format_primitive),
            completed_at: task.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewSubmitResponse {
    pub(crate) task: ReviewTaskResponse,
    pub(crate) regeneration_triggered: bool,
    pub(crate) exam_revision: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ReviewStats {
    pub(crate) total: usize,
    pub(crate) completed: usize,
    pub(crate) pending: usize,
    pub(crate) avg_review_time_seconds: Option<f64>,
    pub(crate) completion_rate: f64,
}
