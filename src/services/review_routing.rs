use crate::db::models::ReviewTaskRow;
use crate::db::types::{ErrorReason, ReviewPriority, ReviewStatus, ReviewTaskStatus};
use crate::schemas::analysis::{AnalysisResult, QuestionAnalysis};
use crate::schemas::review::{AiJudgment, ReviewStats, TeacherJudgment};
use crate::services::overall_stats::compute_overall_stats;

const HIGH_PRIORITY_BELOW: f64 = 0.5;
const MEDIUM_PRIORITY_BELOW: f64 = 0.8;

pub(crate) fn determine_priority(confidence: f64) -> ReviewPriority {
    if confidence < HIGH_PRIORITY_BELOW {
        ReviewPriority::High
    } else if confidence < MEDIUM_PRIORITY_BELOW {
        ReviewPriority::Medium
    } else {
        ReviewPriority::Low
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewReviewTask {
    pub(crate) question_id: String,
    pub(crate) priority: ReviewPriority,
    pub(crate) ai_judgment: AiJudgment,
}

/// One task per question the evaluator could not settle on its own.
pub(crate) fn plan_review_tasks(analysis: &AnalysisResult) -> Vec<NewReviewTask> {
    analysis
        .question_analysis
        .iter()
        .filter(|qa| qa.review_status == ReviewStatus::AiPendingReview)
        .map(|qa| NewReviewTask {
            question_id: qa.question_id.clone(),
            priority: determine_priority(qa.confidence),
            ai_judgment: AiJudgment::from(qa),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReviewerLoad {
    pub(crate) reviewer_id: String,
    pub(crate) subject: Option<String>,
    pub(crate) workload: i64,
}

/// Subject specialists first, then the least busy reviewer; ties keep input order.
pub(crate) fn select_reviewer<'a>(
    pool: &'a [ReviewerLoad],
    exam_subject: Option<&str>,
) -> Option<&'a ReviewerLoad> {
    if let Some(subject) = exam_subject {
        let specialist = pool
            .iter()
            .filter(|reviewer| reviewer.subject.as_deref() == Some(subject))
            .min_by_key(|reviewer| reviewer.workload);
        if specialist.is_some() {
            return specialist;
        }
    }

    pool.iter().min_by_key(|reviewer| reviewer.workload)
}

/// Urgent first, oldest first within the same priority.
pub(crate) fn order_queue(tasks: &mut [ReviewTaskRow]) {
    tasks.sort_by(|left, right| {
        right
            .priority
            .urgency()
            .cmp(&left.priority.urgency())
            .then_with(|| left.created_at.cmp(&right.created_at))
    });
}

/// A flipped verdict without an explicit score takes zero or full marks.
pub(crate) fn apply_teacher_judgment(analysis: &mut QuestionAnalysis, judgment: &TeacherJudgment) {
    let flipped = analysis.is_correct != Some(judgment.is_correct);
    analysis.is_correct = Some(judgment.is_correct);
    analysis.error_reason = Some(match judgment.error_reason {
        Some(reason) => reason,
        None if judgment.is_correct => ErrorReason::NoError,
        None => match analysis.error_reason {
            Some(reason) if reason != ErrorReason::NoError => reason,
            _ => ErrorReason::KnowledgeGap,
        },
    });
    match judgment.score {
        Some(score) => analysis.score_obtained = Some(score),
        None if flipped && !judgment.is_correct => analysis.score_obtained = Some(0.0),
        None if flipped => {
            analysis.score_obtained = analysis.score_total.or(analysis.score_obtained)
        }
        None => {}
    }
    analysis.confidence = 1.0;
    analysis.review_status = ReviewStatus::HumanVerified;
}

/// True when a correction changes anything the diagnosis or report depends on.
pub(crate) fn should_regenerate(before: &QuestionAnalysis, after: &QuestionAnalysis) -> bool {
    before.is_correct != after.is_correct
        || before.error_reason != after.error_reason
        || before.score_obtained != after.score_obtained
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reconciliation {
    pub(crate) before: QuestionAnalysis,
    pub(crate) after: QuestionAnalysis,
    pub(crate) regenerate: bool,
}

/// Overwrites one question's analysis with the teacher's verdict and recomputes the stats.
pub(crate) fn reconcile(
    analysis: &mut AnalysisResult,
    question_id: &str,
    judgment: &TeacherJudgment,
) -> Option<Reconciliation> {
    let entry =
        analysis.question_analysis.iter_mut().find(|qa| qa.question_id == question_id)?;
    let before = entry.clone();
    apply_teacher_judgment(entry, judgment);
    let after = entry.clone();

    analysis.overall_stats = compute_overall_stats(&analysis.question_analysis);

    let regenerate = should_regenerate(&before, &after);
    Some(Reconciliation { before, after, regenerate })
}

pub(crate) fn compute_review_stats(tasks: &[ReviewTaskRow]) -> ReviewStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.status == ReviewTaskStatus::Completed).count();
    let pending = tasks.iter().filter(|task| task.status == ReviewTaskStatus::Pending).count();

    let durations: Vec<f64> = tasks
        .iter()
        .filter(|task| task.status == ReviewTaskStatus::Completed)
        .filter_map(|task| Some((task.completed_at? - task.assigned_at?).as_seconds_f64()))
        .collect();
    let avg_review_time_seconds = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    ReviewStats {
        total,
        completed,
        pending,
        avg_review_time_seconds,
        completion_rate: if total == 0 { 0.0 } else { completed as f64 / total as f64 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::macros::datetime;
    use time::PrimitiveDateTime;

    use crate::db::types::QuestionType;
    use crate::schemas::analysis::AnswerEvidence;

    fn qa(id: &str, is_correct: Option<bool>, confidence: f64) -> QuestionAnalysis {
        QuestionAnalysis {
            question_id: id.to_string(),
            question_type: QuestionType::Objective,
            student_answer: Some("B".to_string()),
            correct_answer: Some("B".to_string()),
            is_correct,
            confidence,
            error_reason: Some(if is_correct == Some(true) {
                ErrorReason::NoError
            } else {
                ErrorReason::KnowledgeGap
            }),
            review_status: crate::services::answer_evaluation::determine_review_status(confidence),
            evidence: AnswerEvidence {
                answer_bbox: None,
                ocr_confidence: confidence,
                answer_clarity: 1.0,
            },
            score_obtained: is_correct.map(|correct| if correct { 2.0 } else { 0.0 }),
            score_total: Some(2.0),
            rationale: None,
        }
    }

    fn task(id: &str, priority: ReviewPriority, created_at: PrimitiveDateTime) -> ReviewTaskRow {
        ReviewTaskRow {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            question_id: "Q1".to_string(),
            priority,
            status: ReviewTaskStatus::Pending,
            assigned_to: None,
            ai_judgment: Json(AiJudgment::from(&qa("Q1", None, 0.3))),
            teacher_judgment: None,
            teacher_comment: None,
            created_at,
            assigned_at: None,
            completed_at: None,
        }
    }

    fn reviewer(id: &str, subject: Option<&str>, workload: i64) -> ReviewerLoad {
        ReviewerLoad { reviewer_id: id.to_string(), subject: subject.map(str::to_string), workload }
    }

    #[test]
    fn priority_bands() {
        assert_eq!(determine_priority(0.0), ReviewPriority::High);
        assert_eq!(determine_priority(0.49), ReviewPriority::High);
        assert_eq!(determine_priority(0.5), ReviewPriority::Medium);
        assert_eq!(determine_priority(0.79), ReviewPriority::Medium);
        assert_eq!(determine_priority(0.8), ReviewPriority::Low);
        assert_eq!(determine_priority(0.945), ReviewPriority::Low);
        assert_eq!(determine_priority(0.43), ReviewPriority::High);
    }

    #[test]
    fn priority_agrees_with_review_status_cutoff() {
        for step in 0..=100 {
            let confidence = f64::from(step) / 100.0;
            let pending = crate::services::answer_evaluation::determine_review_status(confidence)
                == ReviewStatus::AiPendingReview;
            let urgent = determine_priority(confidence) != ReviewPriority::Low;
            assert_eq!(pending, urgent, "{confidence}");
        }
    }

    #[test]
    fn plans_tasks_only_for_pending_items() {
        let analyses =
            vec![qa("Q1", Some(true), 0.95), qa("Q2", None, 0.3), qa("Q3", Some(false), 0.6)];
        let result = AnalysisResult {
            overall_stats: compute_overall_stats(&analyses),
            question_analysis: analyses,
        };
        let planned = plan_review_tasks(&result);
        let summary: Vec<_> =
            planned.iter().map(|task| (task.question_id.as_str(), task.priority)).collect();
        assert_eq!(summary, vec![("Q2", ReviewPriority::High), ("Q3", ReviewPriority::Medium)]);
    }

    #[test]
    fn selects_least_loaded_specialist() {
        let pool = vec![
            reviewer("t1", Some("math"), 5),
            reviewer("t2", Some("physics"), 0),
            reviewer("t3", Some("math"), 2),
            reviewer("t4", Some("math"), 2),
        ];
        let chosen = select_reviewer(&pool, Some("math")).expect("reviewer");
        assert_eq!(chosen.reviewer_id, "t3");
    }

    #[test]
    fn falls_back_to_whole_pool_without_specialist() {
        let pool = vec![reviewer("t1", Some("math"), 3), reviewer("t2", None, 1)];
        let picked = |subject| select_reviewer(&pool, subject).map(|r| r.reviewer_id.as_str());
        assert_eq!(picked(Some("history")), Some("t2"));
        assert_eq!(picked(None), Some("t2"));
        assert!(select_reviewer(&[], Some("math")).is_none());
    }

    #[test]
    fn queue_orders_by_priority_then_age() {
        let mut tasks = vec![
            task("low-old", ReviewPriority::Low, datetime!(2025-01-01 08:00)),
            task("high-new", ReviewPriority::High, datetime!(2025-01-03 08:00)),
            task("medium", ReviewPriority::Medium, datetime!(2025-01-02 08:00)),
            task("high-old", ReviewPriority::High, datetime!(2025-01-02 08:00)),
        ];
        order_queue(&mut tasks);
        let ids: Vec<_> = tasks.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["high-old", "high-new", "medium", "low-old"]);
    }

    #[test]
    fn overturning_correct_verdict_triggers_regeneration() {
        let analyses = vec![qa("Q1", Some(true), 0.7), qa("Q2", Some(true), 0.9)];
        let mut result = AnalysisResult {
            overall_stats: compute_overall_stats(&analyses),
            question_analysis: analyses,
        };
        assert_eq!(result.overall_stats.correct_count, 2);

        let judgment = TeacherJudgment { is_correct: false, error_reason: None, score: Some(0.0) };
        let outcome = reconcile(&mut result, "Q1", &judgment).expect("question exists");

        assert!(outcome.regenerate);
        assert_eq!(outcome.after.confidence, 1.0);
        assert_eq!(outcome.after.review_status, ReviewStatus::HumanVerified);
        assert_eq!(outcome.after.error_reason, Some(ErrorReason::KnowledgeGap));
        assert_eq!(result.overall_stats.correct_count, 1);
        assert_eq!(result.overall_stats.total_score, Some(2.0));
    }

    #[test]
    fn confirming_verdict_does_not_trigger_regeneration() {
        let analyses = vec![qa("Q1", Some(true), 0.6)];
        let mut result = AnalysisResult {
            overall_stats: compute_overall_stats(&analyses),
            question_analysis: analyses,
        };
        let judgment = TeacherJudgment { is_correct: true, error_reason: None, score: None };
        let outcome = reconcile(&mut result, "Q1", &judgment).expect("question exists");

        assert!(!outcome.regenerate);
        assert_eq!(outcome.after.score_obtained, Some(2.0));
        assert_eq!(outcome.after.review_status, ReviewStatus::HumanVerified);
        assert_eq!(result.overall_stats.pending_review_count, 0);
    }

    #[test]
    fn overturn_without_score_zeroes_the_marks() {
        let analyses = vec![qa("Q1", Some(true), 0.7), qa("Q2", Some(true), 0.9)];
        let mut result = AnalysisResult {
            overall_stats: compute_overall_stats(&analyses),
            question_analysis: analyses,
        };
        let judgment = TeacherJudgment { is_correct: false, error_reason: None, score: None };
        let outcome = reconcile(&mut result, "Q1", &judgment).expect("question exists");

        assert!(outcome.regenerate);
        assert_eq!(outcome.after.is_correct, Some(false));
        assert_eq!(outcome.after.score_obtained, Some(0.0));
        assert_eq!(result.overall_stats.correct_count, 1);
        assert_eq!(result.overall_stats.total_score, Some(2.0));
    }

    #[test]
    fn accepting_wrong_answer_without_score_awards_full_marks() {
        let analyses = vec![qa("Q1", Some(false), 0.7)];
        let mut result = AnalysisResult {
            overall_stats: compute_overall_stats(&analyses),
            question_analysis: analyses,
        };
        let judgment = TeacherJudgment { is_correct: true, error_reason: None, score: None };
        let outcome = reconcile(&mut result, "Q1", &judgment).expect("question exists");

        assert_eq!(outcome.after.score_obtained, Some(2.0));
        assert_eq!(outcome.after.error_reason, Some(ErrorReason::NoError));
        assert_eq!(result.overall_stats.total_score, Some(2.0));
    }

    #[test]
    fn reconcile_unknown_question_is_none() {
        let mut result = AnalysisResult {
            overall_stats: compute_overall_stats(&[]),
            question_analysis: Vec::new(),
        };
        let judgment = TeacherJudgment { is_correct: true, error_reason: None, score: None };
        assert!(reconcile(&mut result, "Q9", &judgment).is_none());
    }

    #[test]
    fn review_stats_average_assigned_to_completed() {
        let mut first = task("a", ReviewPriority::High, datetime!(2025-01-01 08:00));
        first.status = ReviewTaskStatus::Completed;
        first.assigned_at = Some(datetime!(2025-01-01 09:00));
        first.completed_at = Some(datetime!(2025-01-01 09:02));
        let mut second = task("b", ReviewPriority::Low, datetime!(2025-01-01 08:00));
        second.status = ReviewTaskStatus::Completed;
        second.assigned_at = Some(datetime!(2025-01-01 10:00));
        second.completed_at = Some(datetime!(2025-01-01 10:04));
        let pending = task("c", ReviewPriority::Medium, datetime!(2025-01-01 08:00));
        let mut cancelled = task("d", ReviewPriority::Medium, datetime!(2025-01-01 08:00));
        cancelled.status = ReviewTaskStatus::Cancelled;

        let stats = compute_review_stats(&[first, second, pending, cancelled]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.avg_review_time_seconds, Some(180.0));
        assert_eq!(stats.completion_rate, 0.5);
    }

    #[test]
    fn review_stats_empty() {
        let stats = compute_review_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_review_time_seconds, None);
        assert_eq!(stats.completion_rate, 0.0);
    }
}
