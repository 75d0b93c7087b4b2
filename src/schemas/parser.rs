use serde::{Deserialize, Serialize};

use crate::db::types::QuestionType;
use crate::schemas::ocr::BoundingBox;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExamMeta {
    pub(crate) subject: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) total_score: Option<u32>,
    pub(crate) exam_type: Option<String>,
    #[serde(default)]
    pub(crate) exam_date: Option<String>,
    #[serde(default)]
    pub(crate) school: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) question_text: String,
    #[serde(default)]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) correct_answer: Option<String>,
    #[serde(default)]
    pub(crate) score: Option<f64>,
    #[serde(default)]
    pub(crate) knowledge_tags: Vec<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<f64>,
    #[serde(default)]
    pub(crate) bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ParsedExam {
    pub(crate) exam_meta: ExamMeta,
    pub(crate) questions: Vec<Question>,
    pub(crate) parsing_confidence: f64,
    #[serde(default)]
    pub(crate) incomplete_fields: Vec<String>,
}
