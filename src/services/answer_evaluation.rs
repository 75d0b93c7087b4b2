use crate::db::types::{ErrorReason, QuestionType, ReviewStatus};
use crate::schemas::analysis::{AnswerEvidence, QuestionAnalysis};
use crate::schemas::parser::Question;
use crate::services::answer_extraction::ExtractedAnswer;

pub(crate) const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.8;
const FUZZY_MATCH_THRESHOLD: f64 = 0.9;
const HARD_QUESTION_DIFFICULTY: f64 = 0.7;
const CARELESS_CONFIDENCE: f64 = 0.8;
const MIN_SUBJECTIVE_ANSWER_CHARS: usize = 10;

pub(crate) fn match_objective(student_answer: &str, correct_answer: &str) -> bool {
    let student = student_answer.trim().to_uppercase();
    let correct = correct_answer.trim().to_uppercase();

    if student == correct {
        return true;
    }

    if let (Some(student_option), Some(correct_option)) =
        (option_letter(&student), option_letter(&correct))
    {
        return student_option == correct_option;
    }

    similarity(&student, &correct) > FUZZY_MATCH_THRESHOLD
}

fn option_letter(text: &str) -> Option<char> {
    text.chars().find(|ch| matches!(ch, 'A'..='D'))
}

/// Normalized edit-distance similarity in [0, 1].
pub(crate) fn similarity(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let longest = left.len().max(right.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&left, &right) as f64 / longest as f64
}

fn levenshtein(left: &[char], right: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, lc) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != rc);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

pub(crate) fn answer_clarity(answer: &str) -> f64 {
    let length = answer.chars().count();
    if length == 0 {
        return 0.0;
    }

    let mut clarity = 1.0;
    if length < 2 {
        clarity *= 0.5;
    }

    let special = answer.chars().filter(|ch| !ch.is_alphanumeric() && !ch.is_whitespace()).count();
    if special as f64 > length as f64 * 0.3 {
        clarity *= 0.7;
    }

    clarity
}

pub(crate) fn type_weight(question_type: QuestionType) -> f64 {
    match question_type {
        QuestionType::Objective => 1.0,
        QuestionType::Subjective => 0.7,
    }
}

pub(crate) fn compute_confidence(
    ocr_confidence: f64,
    answer_clarity: f64,
    question_type: QuestionType,
) -> f64 {
    let confidence = 0.5 * ocr_confidence + 0.3 * answer_clarity + 0.2 * type_weight(question_type);
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

/// An unknown verdict is classified like an incorrect one.
pub(crate) fn classify_error_reason(
    question: &Question,
    student_answer: Option<&str>,
    is_correct: Option<bool>,
    confidence: f64,
) -> ErrorReason {
    if is_correct == Some(true) {
        return ErrorReason::NoError;
    }

    let Some(answer) = student_answer.filter(|answer| !answer.is_empty()) else {
        return ErrorReason::Incomplete;
    };

    if question.question_type == QuestionType::Subjective
        && answer.chars().count() < MIN_SUBJECTIVE_ANSWER_CHARS
    {
        return ErrorReason::Incomplete;
    }

    if question.difficulty.is_some_and(|difficulty| difficulty > HARD_QUESTION_DIFFICULTY) {
        return ErrorReason::KnowledgeGap;
    }

    if question.question_type == QuestionType::Objective && confidence > CARELESS_CONFIDENCE {
        return ErrorReason::Careless;
    }

    ErrorReason::KnowledgeGap
}

pub(crate) fn determine_review_status(confidence: f64) -> ReviewStatus {
    if confidence >= REVIEW_CONFIDENCE_THRESHOLD {
        ReviewStatus::AiConfident
    } else {
        ReviewStatus::AiPendingReview
    }
}

/// Judges one question from its extracted answer. Subjective verdicts stay unknown.
pub(crate) fn evaluate_question(
    question: &Question,
    extracted: ExtractedAnswer,
) -> QuestionAnalysis {
    let student_answer = extracted.text.filter(|answer| !answer.is_empty());
    let clarity = answer_clarity(student_answer.as_deref().unwrap_or(""));

    let is_correct = match (question.question_type, &student_answer, &question.correct_answer) {
        (QuestionType::Objective, Some(answer), Some(correct)) => {
            Some(match_objective(answer, correct))
        }
        _ => None,
    };

    let confidence = compute_confidence(extracted.ocr_confidence, clarity, question.question_type);
    let error_reason =
        classify_error_reason(question, student_answer.as_deref(), is_correct, confidence);

    QuestionAnalysis {
        question_id: question.question_id.clone(),
        question_type: question.question_type,
        student_answer,
        correct_answer: question.correct_answer.clone(),
        is_correct,
        confidence,
        error_reason: Some(error_reason),
        review_status: determine_review_status(confidence),
        evidence: AnswerEvidence {
            answer_bbox: extracted.bbox,
            ocr_confidence: extracted.ocr_confidence,
            answer_clarity: clarity,
        },
        score_obtained: obtained_score(is_correct, question.score),
        score_total: question.score,
        rationale: None,
    }
}

fn obtained_score(is_correct: Option<bool>, score: Option<f64>) -> Option<f64> {
    match (is_correct, score) {
        (Some(true), Some(score)) => Some(score),
        (Some(false), Some(_)) => Some(0.0),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubjectiveScore {
    pub(crate) score_ratio: f64,
    pub(crate) is_correct: bool,
    pub(crate) rationale: String,
    /// Set when the scorer fell back to its neutral default.
    pub(crate) evaluation_failed: bool,
}

/// Folds an external subjective verdict into the analysis. Fallback verdicts are ignored.
pub(crate) fn apply_subjective_score(
    question: &Question,
    analysis: &mut QuestionAnalysis,
    verdict: &SubjectiveScore,
) -> bool {
    if verdict.evaluation_failed {
        return false;
    }

    let ratio = verdict.score_ratio.clamp(0.0, 1.0);
    analysis.is_correct = Some(verdict.is_correct);
    analysis.score_obtained = question.score.map(|max_score| ratio * max_score);
    analysis.rationale = Some(verdict.rationale.clone());
    analysis.error_reason = Some(classify_error_reason(
        question,
        analysis.student_answer.as_deref(),
        analysis.is_correct,
        analysis.confidence,
    ));
    true
}
