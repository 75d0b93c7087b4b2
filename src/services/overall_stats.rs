use crate::db::types::{QuestionType, ReviewStatus};
use crate::schemas::analysis::{OverallStats, QuestionAnalysis};

/// Recomputes exam-level statistics from scratch.
pub(crate) fn compute_overall_stats(analyses: &[QuestionAnalysis]) -> OverallStats {
    let correct_count = analyses.iter().filter(|qa| qa.is_correct == Some(true)).count();

    OverallStats {
        total_questions: analyses.len(),
        correct_count,
        objective_accuracy: accuracy(analyses, QuestionType::Objective),
        subjective_accuracy: accuracy(analyses, QuestionType::Subjective),
        pending_review_count: analyses
            .iter()
            .filter(|qa| qa.review_status == ReviewStatus::AiPendingReview)
            .count(),
        total_score: sum_present(analyses.iter().map(|qa| qa.score_obtained)),
        max_score: sum_present(analyses.iter().map(|qa| qa.score_total)),
    }
}

fn accuracy(analyses: &[QuestionAnalysis], question_type: QuestionType) -> f64 {
    let (total, correct) = analyses
        .iter()
        .filter(|qa| qa.question_type == question_type)
        .fold((0usize, 0usize), |(total, correct), qa| {
            (total + 1, correct + usize::from(qa.is_correct == Some(true)))
        });

    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

fn sum_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, value| Some(acc.unwrap_or(0.0) + value))
}
