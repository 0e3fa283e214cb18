use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test_attempt::AttemptGrade;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Marks deducted per wrong answer. Zero disables negative marking.
    pub penalty_factor: f64,
    /// Minimum percentage (0-100) required to pass.
    pub passing_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            penalty_factor: 0.0,
            passing_threshold: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub correct: i32,
    pub wrong: i32,
    pub unanswered: i32,
    pub total_questions: i32,
    pub raw_score: f64,
    pub percentage_score: f64,
    pub passed: bool,
}

impl ScoreResult {
    pub fn to_grade(&self) -> AttemptGrade {
        let dec = |v: f64| {
            Decimal::from_f64(v)
                .map(|d| d.round_dp(2))
                .unwrap_or(Decimal::ZERO)
        };
        AttemptGrade {
            score: dec(self.raw_score),
            percentage_score: dec(self.percentage_score),
            passed: self.passed,
            correct_answers: self.correct,
            wrong_answers: self.wrong,
            unanswered_questions: self.unanswered,
        }
    }
}

pub struct GradingService;

impl GradingService {
    /// Grades answers against the question bank. Every bank question counts
    /// towards the total; questions with no answer, or an answer without a
    /// selection, are unanswered. Pure: the same inputs give the same result.
    pub fn score(answers: &[Answer], bank: &[Question], policy: &ScoringPolicy) -> ScoreResult {
        let by_question: HashMap<i32, &Answer> = answers
            .iter()
            .rev()
            .map(|a| (a.question_id, a))
            .collect();

        let mut correct = 0;
        let mut wrong = 0;
        let mut unanswered = 0;

        for q in bank {
            match by_question.get(&q.id).and_then(|a| a.selected) {
                Some(selected) if selected == q.correct_option => correct += 1,
                Some(_) => wrong += 1,
                None => unanswered += 1,
            }
        }

        let total_questions = bank.len() as i32;
        let raw_score = correct as f64 - (wrong as f64 * policy.penalty_factor);
        let percentage_score = if total_questions > 0 {
            (raw_score / total_questions as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        ScoreResult {
            correct,
            wrong,
            unanswered,
            total_questions,
            raw_score,
            percentage_score,
            passed: percentage_score >= policy.passing_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(n: i32) -> Vec<Question> {
        (1..=n)
            .map(|id| Question {
                id,
                question: format!("Q{}", id),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option: id % 4,
                active: true,
            })
            .collect()
    }

    fn answer(q: &Question, correct: bool) -> Answer {
        Answer {
            question_id: q.id,
            selected: Some(if correct {
                q.correct_option
            } else {
                (q.correct_option + 1) % 4
            }),
        }
    }

    #[test]
    fn thirty_of_forty_passes_at_seventy_five_percent() {
        let bank = bank(40);
        let mut answers = Vec::new();
        for q in &bank[..30] {
            answers.push(answer(q, true));
        }
        for q in &bank[30..35] {
            answers.push(answer(q, false));
        }

        let result = GradingService::score(&answers, &bank, &ScoringPolicy::default());
        assert_eq!(result.correct, 30);
        assert_eq!(result.wrong, 5);
        assert_eq!(result.unanswered, 5);
        assert_eq!(result.raw_score, 30.0);
        assert_eq!(result.percentage_score, 75.0);
        assert!(result.passed);
    }

    #[test]
    fn scoring_is_deterministic() {
        let bank = bank(10);
        let answers: Vec<Answer> = bank.iter().take(7).map(|q| answer(q, q.id % 2 == 0)).collect();
        let policy = ScoringPolicy {
            penalty_factor: 0.25,
            passing_threshold: 40.0,
        };
        let first = GradingService::score(&answers, &bank, &policy);
        let second = GradingService::score(&answers, &bank, &policy);
        assert_eq!(first, second);
    }

    #[test]
    fn penalty_never_drives_percentage_below_zero() {
        let bank = bank(4);
        let answers: Vec<Answer> = bank.iter().map(|q| answer(q, false)).collect();
        let policy = ScoringPolicy {
            penalty_factor: 1.0,
            passing_threshold: 60.0,
        };
        let result = GradingService::score(&answers, &bank, &policy);
        assert_eq!(result.raw_score, -4.0);
        assert_eq!(result.percentage_score, 0.0);
        assert!(!result.passed);
    }

    #[test]
    fn threshold_is_inclusive() {
        let bank = bank(5);
        let answers: Vec<Answer> = bank.iter().take(3).map(|q| answer(q, true)).collect();
        let result = GradingService::score(&answers, &bank, &ScoringPolicy::default());
        assert_eq!(result.percentage_score, 60.0);
        assert!(result.passed);
    }

    #[test]
    fn skipped_selection_counts_as_unanswered() {
        let bank = bank(2);
        let answers = vec![Answer {
            question_id: 1,
            selected: None,
        }];
        let result = GradingService::score(&answers, &bank, &ScoringPolicy::default());
        assert_eq!(result.unanswered, 2);
        assert_eq!(result.correct + result.wrong, 0);
    }

    #[test]
    fn empty_bank_scores_zero() {
        let result = GradingService::score(&[], &[], &ScoringPolicy::default());
        assert_eq!(result.total_questions, 0);
        assert_eq!(result.percentage_score, 0.0);
        assert!(!result.passed);
    }

    #[test]
    fn grade_rounds_to_two_places() {
        let bank = bank(3);
        let answers = vec![answer(&bank[0], true)];
        let grade = GradingService::score(&answers, &bank, &ScoringPolicy::default()).to_grade();
        assert_eq!(grade.percentage_score, Decimal::new(3333, 2));
        assert_eq!(grade.score, Decimal::ONE);
    }
}
