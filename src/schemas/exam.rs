use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::ExamRow;
use crate::db::types::ExamStatus;
use crate::schemas::analysis::AnalysisResult;
use crate::schemas::diagnostic::{DiagnosticReport, ReportArtifact};
use crate::schemas::ocr::OcrResult;
use crate::schemas::parser::ParsedExam;

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamCreatedResponse {
    pub(crate) id: String,
    pub(crate) status: ExamStatus,
    pub(crate) created_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) subject: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) completed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamDetailResponse {
    pub(crate) id: String,
    pub(crate) subject: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) revision: i64,
    pub(crate) error_message: Option<String>,
    pub(crate) ocr_result: Option<OcrResult>,
    pub(crate) parsed_result: Option<ParsedExam>,
    pub(crate) analysis_result: Option<AnalysisResult>,
    pub(crate) diagnostic_report: Option<DiagnosticReport>,
    pub(crate) report_artifact: Option<ReportArtifact>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) completed_at: Option<String>,
}

impl From<&ExamRow> for ExamSummaryResponse {
    fn from(exam: &ExamRow) -> Self {
        Self {
            id: exam.id.clone(),
            subject: exam.subject.clone(),
            status: exam.status,
            error_message: exam.error_message.clone(),
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            completed_at: exam.completed_at.map(format_primitive),
        }
    }
}

impl From<ExamRow> for ExamDetailResponse {
    fn from(exam: ExamRow) -> Self {
        Self {
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            completed_at: exam.completed_at.map(format_primitive),
            id: exam.id,
            subject: exam.subject,
            status: exam.status,
            revision: exam.revision,
            error_message: exam.error_message,
            ocr_result: exam.ocr_result.map(|value| value.0),
            parsed_result: exam.parsed_result.map(|value| value.0),
            analysis_result: exam.analysis_result.map(|value| value.0),
            diagnostic_report: exam.diagnostic_report.map(|value| value.0),
            report_artifact: exam.report_artifact.map(|value| value.0),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamRetryResponse {
    pub(crate) id: String,
    pub(crate) status: ExamStatus,
    pub(crate) retry_requested: bool,
}
