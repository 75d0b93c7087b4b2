use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::schemas::diagnostic::DiagnosisDraft;
use crate::schemas::parser::Question;
use crate::services::ai_client::AiClient;
use crate::services::answer_evaluation::SubjectiveScore;
use crate::services::collaborators::{
    DiagnosisGenerator, KnowledgeEnrichment, KnowledgeTagger, SubjectiveRequest, SubjectiveScorer,
};
use crate::services::diagnosis::ExamSummary;
use crate::services::retry::RetryPolicy;

const TAGGING_INSTRUCTION: &str = "Return JSON {\"knowledge_tags\": [string], \
    \"difficulty\": number in [0,1]} for the question.";
const SCORING_INSTRUCTION: &str = "Return JSON {\"score_ratio\": number in [0,1], \
    \"is_correct\": bool, \"rationale\": string} grading the student answer.";
const DIAGNOSIS_INSTRUCTION: &str = "Return JSON {\"capability_dimensions\": {comprehension, \
    application, analysis, synthesis, evaluation}, \"surface_issues\": [issue], \
    \"deep_issues\": [issue]} where issue is {issue, severity, evidence, ai_addressable, \
    consequence, root_cause}.";

pub(crate) const EVALUATION_FAILED: &str = "evaluation failed";

#[derive(Clone)]
pub(crate) struct AiKnowledgeTagger {
    client: AiClient,
    retry: RetryPolicy,
}

impl AiKnowledgeTagger {
    pub(crate) fn new(client: AiClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl KnowledgeTagger for AiKnowledgeTagger {
    async fn enrich(
        &self,
        question: &Question,
        subject: Option<&str>,
    ) -> anyhow::Result<KnowledgeEnrichment> {
        let input = json!({
            "subject": subject,
            "question_type": question.question_type,
            "question_text": question.question_text,
            "options": question.options,
        });
        let mut enrichment: KnowledgeEnrichment = self
            .retry
            .run("knowledge_tagging", || {
                self.client.complete_json("knowledge tagging", TAGGING_INSTRUCTION, &input)
            })
            .await?;
        enrichment.difficulty = enrichment.difficulty.map(|value| value.clamp(0.0, 1.0));
        Ok(enrichment)
    }
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score_ratio: f64,
    is_correct: bool,
    #[serde(default)]
    rationale: String,
}

#[derive(Clone)]
pub(crate) struct AiSubjectiveScorer {
    client: AiClient,
    retry: RetryPolicy,
}

impl AiSubjectiveScorer {
    pub(crate) fn new(client: AiClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl SubjectiveScorer for AiSubjectiveScorer {
    async fn evaluate(&self, request: SubjectiveRequest<'_>) -> SubjectiveScore {
        let input = json!({
            "question_text": request.question_text,
            "student_answer": request.student_answer,
            "correct_answer": request.correct_answer,
            "max_score": request.max_score,
        });
        let reply = self
            .retry
            .run("subjective_scoring", || {
                self.client.complete_json::<ScoreReply>(
                    "subjective scoring",
                    SCORING_INSTRUCTION,
                    &input,
                )
            })
            .await;

        match reply {
            Ok(reply) if reply.score_ratio.is_finite() => SubjectiveScore {
                score_ratio: reply.score_ratio.clamp(0.0, 1.0),
                is_correct: reply.is_correct,
                rationale: reply.rationale,
                evaluation_failed: false,
            },
            Ok(reply) => {
                tracing::warn!(
                    score_ratio = reply.score_ratio,
                    "subjective scorer returned a non-finite ratio"
                );
                fallback_score()
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "subjective scoring failed");
                fallback_score()
            }
        }
    }
}

/// Neutral verdict reported when the scorer cannot produce one.
pub(crate) fn fallback_score() -> SubjectiveScore {
    SubjectiveScore {
        score_ratio: 0.5,
        is_correct: false,
        rationale: EVALUATION_FAILED.to_string(),
        evaluation_failed: true,
    }
}

#[derive(Clone)]
pub(crate) struct AiDiagnosisGenerator {
    client: AiClient,
    retry: RetryPolicy,
}

impl AiDiagnosisGenerator {
    pub(crate) fn new(client: AiClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl DiagnosisGenerator for AiDiagnosisGenerator {
    async fn diagnose(&self, summary: &ExamSummary) -> anyhow::Result<DiagnosisDraft> {
        let input = serde_json::to_value(summary)?;
        self.retry
            .run("diagnosis", || {
                self.client.complete_json("diagnosis", DIAGNOSIS_INSTRUCTION, &input)
            })
            .await
    }
}
