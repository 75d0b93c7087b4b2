use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CapabilityDimensions {
    pub(crate) comprehension: f64,
    pub(crate) application: f64,
    pub(crate) analysis: f64,
    pub(crate) synthesis: f64,
    pub(crate) evaluation: f64,
}

impl CapabilityDimensions {
    pub(crate) fn neutral() -> Self {
        Self {
            comprehension: 0.5,
            application: 0.5,
            analysis: 0.5,
            synthesis: 0.5,
            evaluation: 0.5,
        }
    }

    pub(crate) fn values(&self) -> [f64; 5] {
        [self.comprehension, self.application, self.analysis, self.synthesis, self.evaluation]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum IssueSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Issue {
    pub(crate) issue: String,
    pub(crate) severity: IssueSeverity,
    pub(crate) evidence: Vec<String>,
    pub(crate) ai_addressable: bool,
    #[serde(default)]
    pub(crate) consequence: Option<String>,
    #[serde(default)]
    pub(crate) root_cause: Option<String>,
}

/// Diagnosis as returned by the generator, before the pipeline stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DiagnosisDraft {
    pub(crate) capability_dimensions: CapabilityDimensions,
    #[serde(default)]
    pub(crate) surface_issues: Vec<Issue>,
    #[serde(default)]
    pub(crate) deep_issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DiagnosticReport {
    pub(crate) capability_dimensions: CapabilityDimensions,
    pub(crate) surface_issues: Vec<Issue>,
    pub(crate) deep_issues: Vec<Issue>,
    #[serde(default)]
    pub(crate) requires_manual_review: bool,
    /// Exam revision of the analysis this report was derived from.
    #[serde(default)]
    pub(crate) analysis_revision: i64,
}

impl DiagnosticReport {
    pub(crate) fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.surface_issues.iter().chain(self.deep_issues.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ReportArtifact {
    pub(crate) artifact_refs: Vec<String>,
    pub(crate) analysis_revision: i64,
}
