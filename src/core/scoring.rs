// src/core/scoring.rs

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::models::question::Question;
use crate::models::score::ScoreResult;

/// Correctness and points earned for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub selected: Vec<String>,
    pub is_correct: bool,
    pub score_earned: i64,
}

/// Full scoring output: the persisted grade plus the per-question breakdown
/// kept in the answer history.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub result: ScoreResult,
    pub breakdown: Vec<QuestionOutcome>,
    pub correct_count: usize,
}

/// Malformed submissions, rejected before scoring begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    EmptyQuestionSet,
    UnknownQuestion(i64),
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::EmptyQuestionSet => write!(f, "no questions to score"),
            ScoringError::UnknownQuestion(id) => {
                write!(f, "answer references unknown question {}", id)
            }
        }
    }
}

impl std::error::Error for ScoringError {}

/// Boundary check: a submission may only reference questions from the given
/// set, and the set itself must not be empty. `score` assumes this passed.
pub fn validate_submission(
    questions: &[Question],
    answers: &HashMap<i64, Vec<String>>,
) -> Result<(), ScoringError> {
    if questions.is_empty() {
        return Err(ScoringError::EmptyQuestionSet);
    }
    for id in answers.keys() {
        if !questions.iter().any(|q| q.id == *id) {
            return Err(ScoringError::UnknownQuestion(*id));
        }
    }
    Ok(())
}

/// Pure scoring function. Deterministic and idempotent: identical inputs
/// always produce an identical report, and it has no side effects.
///
/// A question is correct only on exact set equality between the submitted
/// letters and the answer key; a missing or extra letter on a multi-select
/// question earns nothing.
pub fn score(
    questions: &[Question],
    answers: &HashMap<i64, Vec<String>>,
    points_per_question: i64,
    passing_score_percent: i64,
    now: DateTime<Utc>,
) -> ScoreReport {
    let mut total_score = 0i64;
    let mut correct_count = 0usize;
    let mut breakdown = Vec::with_capacity(questions.len());

    for question in questions {
        let selected = answers.get(&question.id).cloned().unwrap_or_default();

        let submitted: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        let expected: BTreeSet<&str> = question
            .correct_letters
            .0
            .iter()
            .map(String::as_str)
            .collect();

        let is_correct = submitted == expected;
        let score_earned = if is_correct { points_per_question } else { 0 };

        if is_correct {
            total_score += points_per_question;
            correct_count += 1;
        }

        breakdown.push(QuestionOutcome {
            question_id: question.id,
            selected,
            is_correct,
            score_earned,
        });
    }

    let max_score = points_per_question * questions.len() as i64;
    let percent = if max_score > 0 {
        total_score as f64 / max_score as f64 * 100.0
    } else {
        0.0
    };
    let passed = percent >= passing_score_percent as f64;

    ScoreReport {
        result: ScoreResult {
            total_score,
            max_score,
            percent,
            passed,
            completed_at: now,
        },
        breakdown,
        correct_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Choice;
    use chrono::TimeZone;
    use sqlx::types::Json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn question(id: i64, correct: &[&str]) -> Question {
        Question {
            id,
            course_id: 1,
            prompt: format!("Question {}", id),
            choices: Json(
                ["A", "B", "C", "D"]
                    .iter()
                    .map(|l| Choice {
                        letter: l.to_string(),
                        text: format!("Option {}", l),
                    })
                    .collect(),
            ),
            correct_letters: Json(correct.iter().map(|s| s.to_string()).collect()),
            created_at: None,
        }
    }

    fn answer(pairs: &[(i64, &[&str])]) -> HashMap<i64, Vec<String>> {
        pairs
            .iter()
            .map(|(id, letters)| (*id, letters.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn ten_questions_seven_correct_is_seventy_percent() {
        let questions: Vec<Question> = (1..=10).map(|id| question(id, &["A"])).collect();
        let answers = answer(&[
            (1, &["A"]),
            (2, &["A"]),
            (3, &["A"]),
            (4, &["A"]),
            (5, &["A"]),
            (6, &["A"]),
            (7, &["A"]),
            (8, &["B"]),
            (9, &["B"]),
            (10, &["B"]),
        ]);

        let report = score(&questions, &answers, 20, 70, now());
        assert_eq!(report.result.total_score, 140);
        assert_eq!(report.result.max_score, 200);
        assert_eq!(report.result.percent, 70.0);
        assert_eq!(report.correct_count, 7);
        assert!(report.result.passed);

        // One point higher threshold flips the verdict.
        let report = score(&questions, &answers, 20, 71, now());
        assert!(!report.result.passed);
    }

    #[test]
    fn multi_select_missing_one_letter_earns_nothing() {
        let questions = vec![question(1, &["A", "C"])];

        let report = score(&questions, &answer(&[(1, &["A"])]), 20, 70, now());
        assert_eq!(report.result.total_score, 0);
        assert!(!report.breakdown[0].is_correct);

        // An extra letter is just as wrong.
        let report = score(&questions, &answer(&[(1, &["A", "C", "D"])]), 20, 70, now());
        assert_eq!(report.result.total_score, 0);

        // Order within the selection does not matter.
        let report = score(&questions, &answer(&[(1, &["C", "A"])]), 20, 70, now());
        assert_eq!(report.result.total_score, 20);
        assert!(report.breakdown[0].is_correct);
    }

    #[test]
    fn unanswered_questions_count_as_wrong() {
        let questions = vec![question(1, &["A"]), question(2, &["B"])];
        let report = score(&questions, &answer(&[(1, &["A"])]), 20, 70, now());
        assert_eq!(report.result.total_score, 20);
        assert_eq!(report.result.max_score, 40);
        assert_eq!(report.breakdown.len(), 2);
        assert!(!report.breakdown[1].is_correct);
    }

    #[test]
    fn empty_question_set_yields_zero_percent_not_a_division_error() {
        let report = score(&[], &HashMap::new(), 20, 70, now());
        assert_eq!(report.result.max_score, 0);
        assert_eq!(report.result.percent, 0.0);
        assert!(!report.result.passed);
    }

    #[test]
    fn scoring_is_deterministic_and_idempotent() {
        let questions = vec![question(1, &["A"]), question(2, &["B", "C"])];
        let answers = answer(&[(1, &["A"]), (2, &["B", "C"])]);
        let first = score(&questions, &answers, 20, 70, now());
        let second = score(&questions, &answers, 20, 70, now());
        assert_eq!(first, second);
    }

    #[test]
    fn validation_rejects_empty_set_and_unknown_ids() {
        assert_eq!(
            validate_submission(&[], &HashMap::new()),
            Err(ScoringError::EmptyQuestionSet)
        );

        let questions = vec![question(1, &["A"])];
        assert_eq!(
            validate_submission(&questions, &answer(&[(99, &["A"])])),
            Err(ScoringError::UnknownQuestion(99))
        );
        assert_eq!(
            validate_submission(&questions, &answer(&[(1, &["A"])])),
            Ok(())
        );
    }
}
