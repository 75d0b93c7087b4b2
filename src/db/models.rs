use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExamStatus, ReviewPriority, ReviewTaskStatus};
use crate::schemas::analysis::AnalysisResult;
use crate::schemas::diagnostic::{DiagnosticReport, ReportArtifact};
use crate::schemas::ocr::OcrResult;
use crate::schemas::parser::ParsedExam;
use crate::schemas::review::{AiJudgment, TeacherJudgment};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamRow {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) subject: Option<String>,
    pub(crate) image_key: String,
    pub(crate) status: ExamStatus,
    pub(crate) ocr_result: Option<Json<OcrResult>>,
    pub(crate) parsed_result: Option<Json<ParsedExam>>,
    pub(crate) analysis_result: Option<Json<AnalysisResult>>,
    pub(crate) diagnostic_report: Option<Json<DiagnosticReport>>,
    pub(crate) report_artifact: Option<Json<ReportArtifact>>,
    pub(crate) error_message: Option<String>,
    pub(crate) revision: i64,
    pub(crate) retry_requested: bool,
    pub(crate) lease_expires_at: Option<PrimitiveDateTime>,
    pub(crate) stage_started_at: Option<PrimitiveDateTime>,
    pub(crate) is_deleted: bool,
    pub(crate) deleted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

impl ExamRow {
    pub(crate) fn new(
        id: String,
        user_id: String,
        subject: Option<String>,
        image_key: String,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            id,
            user_id,
            subject,
            image_key,
            status: ExamStatus::Uploaded,
            ocr_result: None,
            parsed_result: None,
            analysis_result: None,
            diagnostic_report: None,
            report_artifact: None,
            error_message: None,
            revision: 0,
            retry_requested: false,
            lease_expires_at: None,
            stage_started_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ReviewTaskRow {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) question_id: String,
    pub(crate) priority: ReviewPriority,
    pub(crate) status: ReviewTaskStatus,
    pub(crate) assigned_to: Option<String>,
    pub(crate) ai_judgment: Json<AiJudgment>,
    pub(crate) teacher_judgment: Option<Json<TeacherJudgment>>,
    pub(crate) teacher_comment: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) assigned_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ReviewerRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) subject: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}
