use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "examstatus", rename_all = "snake_case")]
pub(crate) enum ExamStatus {
    Uploaded,
    OcrProcessing,
    OcrCompleted,
    OcrFailed,
    Parsing,
    Parsed,
    ParsingFailed,
    Analyzing,
    Analyzed,
    AnalyzingFailed,
    Diagnosing,
    Diagnosed,
    DiagnosingFailed,
    ReportGenerating,
    ReportGenerated,
    ReportGenerationFailed,
    Completed,
    Reviewed,
    Failed,
}

impl ExamStatus {
    pub(crate) const ALL: [ExamStatus; 19] = [
        ExamStatus::Uploaded,
        ExamStatus::OcrProcessing,
        ExamStatus::OcrCompleted,
        ExamStatus::OcrFailed,
        ExamStatus::Parsing,
        ExamStatus::Parsed,
        ExamStatus::ParsingFailed,
        ExamStatus::Analyzing,
        ExamStatus::Analyzed,
        ExamStatus::AnalyzingFailed,
        ExamStatus::Diagnosing,
        ExamStatus::Diagnosed,
        ExamStatus::DiagnosingFailed,
        ExamStatus::ReportGenerating,
        ExamStatus::ReportGenerated,
        ExamStatus::ReportGenerationFailed,
        ExamStatus::Completed,
        ExamStatus::Reviewed,
        ExamStatus::Failed,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ExamStatus::Uploaded => "uploaded",
            ExamStatus::OcrProcessing => "ocr_processing",
            ExamStatus::OcrCompleted => "ocr_completed",
            ExamStatus::OcrFailed => "ocr_failed",
            ExamStatus::Parsing => "parsing",
            ExamStatus::Parsed => "parsed",
            ExamStatus::ParsingFailed => "parsing_failed",
            ExamStatus::Analyzing => "analyzing",
            ExamStatus::Analyzed => "analyzed",
            ExamStatus::AnalyzingFailed => "analyzing_failed",
            ExamStatus::Diagnosing => "diagnosing",
            ExamStatus::Diagnosed => "diagnosed",
            ExamStatus::DiagnosingFailed => "diagnosing_failed",
            ExamStatus::ReportGenerating => "report_generating",
            ExamStatus::ReportGenerated => "report_generated",
            ExamStatus::ReportGenerationFailed => "report_generation_failed",
            ExamStatus::Completed => "completed",
            ExamStatus::Reviewed => "reviewed",
            ExamStatus::Failed => "failed",
        }
    }

    /// States in which a pipeline stage is running and owns the exam record.
    pub(crate) fn is_in_progress(self) -> bool {
        matches!(
            self,
            ExamStatus::OcrProcessing
                | ExamStatus::Parsing
                | ExamStatus::Analyzing
                | ExamStatus::Diagnosing
                | ExamStatus::ReportGenerating
        )
    }

    pub(crate) fn is_failure(self) -> bool {
        matches!(
            self,
            ExamStatus::OcrFailed
                | ExamStatus::ParsingFailed
                | ExamStatus::AnalyzingFailed
                | ExamStatus::DiagnosingFailed
                | ExamStatus::ReportGenerationFailed
                | ExamStatus::Failed
        )
    }
}

impl std::fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "reviewpriority", rename_all = "lowercase")]
pub(crate) enum ReviewPriority {
    High,
    Medium,
    Low,
}

impl ReviewPriority {
    /// Larger is more urgent.
    pub(crate) fn urgency(self) -> u8 {
        match self {
            ReviewPriority::High => 2,
            ReviewPriority::Medium => 1,
            ReviewPriority::Low => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "reviewtaskstatus", rename_all = "snake_case")]
pub(crate) enum ReviewTaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ReviewTaskStatus {
    pub(crate) fn is_open(self) -> bool {
        matches!(self, ReviewTaskStatus::Pending | ReviewTaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum QuestionType {
    Objective,
    Subjective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReviewStatus {
    AiConfident,
    AiPendingReview,
    HumanVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ErrorReason {
    KnowledgeGap,
    Misunderstanding,
    Careless,
    LogicError,
    Incomplete,
    NoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TextType {
    Printed,
    Handwritten,
}
