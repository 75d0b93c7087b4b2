use thiserror::Error;

use crate::db::types::ExamStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition from {from} to {to}")]
pub(crate) struct IllegalTransition {
    pub(crate) from: ExamStatus,
    pub(crate) to: ExamStatus,
}

/// Direct successors of every status.
pub(crate) fn successors(status: ExamStatus) -> &'static [ExamStatus] {
    use ExamStatus::*;

    match status {
        Uploaded => &[OcrProcessing],
        OcrProcessing => &[OcrCompleted, OcrFailed],
        OcrCompleted => &[Parsing],
        OcrFailed => &[OcrProcessing],
        Parsing => &[Parsed, ParsingFailed],
        Parsed => &[Analyzing],
        ParsingFailed => &[Parsing],
        Analyzing => &[Analyzed, AnalyzingFailed],
        Analyzed => &[Diagnosing, Reviewed],
        AnalyzingFailed => &[Analyzing],
        Diagnosing => &[Diagnosed, DiagnosingFailed, Reviewed],
        Diagnosed => &[ReportGenerating, Reviewed],
        DiagnosingFailed => &[Diagnosing],
        ReportGenerating => &[ReportGenerated, ReportGenerationFailed, Reviewed],
        ReportGenerated => &[Completed, Reviewed],
        ReportGenerationFailed => &[ReportGenerating],
        Completed => &[Reviewed],
        Reviewed => &[Diagnosing],
        Failed => &[],
    }
}

pub(crate) fn can_transition(from: ExamStatus, to: ExamStatus) -> bool {
    successors(from).contains(&to)
}

pub(crate) fn transition(
    from: ExamStatus,
    to: ExamStatus,
) -> Result<ExamStatus, IllegalTransition> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// A unit of pipeline work that moves an exam through one in-progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    Ocr,
    Parse,
    Analyze,
    Diagnose,
    Report,
}

impl Stage {
    pub(crate) const ALL: [Stage; 5] =
        [Stage::Ocr, Stage::Parse, Stage::Analyze, Stage::Diagnose, Stage::Report];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Parse => "parse",
            Stage::Analyze => "analyze",
            Stage::Diagnose => "diagnose",
            Stage::Report => "report",
        }
    }

    pub(crate) fn in_progress(self) -> ExamStatus {
        match self {
            Stage::Ocr => ExamStatus::OcrProcessing,
            Stage::Parse => ExamStatus::Parsing,
            Stage::Analyze => ExamStatus::Analyzing,
            Stage::Diagnose => ExamStatus::Diagnosing,
            Stage::Report => ExamStatus::ReportGenerating,
        }
    }

    pub(crate) fn success(self) -> ExamStatus {
        match self {
            Stage::Ocr => ExamStatus::OcrCompleted,
            Stage::Parse => ExamStatus::Parsed,
            Stage::Analyze => ExamStatus::Analyzed,
            Stage::Diagnose => ExamStatus::Diagnosed,
            Stage::Report => ExamStatus::ReportGenerated,
        }
    }

    pub(crate) fn failure(self) -> ExamStatus {
        match self {
            Stage::Ocr => ExamStatus::OcrFailed,
            Stage::Parse => ExamStatus::ParsingFailed,
            Stage::Analyze => ExamStatus::AnalyzingFailed,
            Stage::Diagnose => ExamStatus::DiagnosingFailed,
            Stage::Report => ExamStatus::ReportGenerationFailed,
        }
    }

    pub(crate) fn for_in_progress(status: ExamStatus) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.in_progress() == status)
    }

    pub(crate) fn for_failure(status: ExamStatus) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.failure() == status)
    }

    /// Whether this stage may start from `status`.
    pub(crate) fn can_start_from(self, status: ExamStatus) -> bool {
        can_transition(status, self.in_progress())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineStep {
    Run(Stage),
    /// Bookkeeping transition without stage work.
    Complete,
}

/// Picks the next legal step for an idle exam, reading only persisted state.
pub(crate) fn next_step(
    status: ExamStatus,
    retry_requested: bool,
    regenerate_after_review: bool,
) -> Option<PipelineStep> {
    match status {
        ExamStatus::Uploaded => Some(PipelineStep::Run(Stage::Ocr)),
        ExamStatus::OcrCompleted => Some(PipelineStep::Run(Stage::Parse)),
        ExamStatus::Parsed => Some(PipelineStep::Run(Stage::Analyze)),
        ExamStatus::Analyzed => Some(PipelineStep::Run(Stage::Diagnose)),
        ExamStatus::Reviewed if regenerate_after_review || retry_requested => {
            Some(PipelineStep::Run(Stage::Diagnose))
        }
        ExamStatus::Diagnosed => Some(PipelineStep::Run(Stage::Report)),
        ExamStatus::ReportGenerated => Some(PipelineStep::Complete),
        status if retry_requested => Stage::for_failure(status).map(PipelineStep::Run),
        _ => None,
    }
}
