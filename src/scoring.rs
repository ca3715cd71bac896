//! Survey scoring.
//!
//! Pure functions: a submission is checked against the survey's questions and turned into
//! per-question scores, a percentage and a grade before anything touches the store.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::FieldError,
    models::{AnswerInput, Question, QuestionType, ScoredAnswer},
};

/// The outcome of scoring one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub grade: &'static str,
    pub passed: Option<bool>,
    pub answers: Vec<ScoredAnswer>,
}

/// grade_for
///
/// Maps a percentage onto the readiness ladder.
pub fn grade_for(percentage: f64) -> &'static str {
    match percentage {
        p if p >= 90.0 => "Expert",
        p if p >= 80.0 => "Advanced",
        p if p >= 70.0 => "Intermediate",
        p if p >= 60.0 => "Beginner",
        _ => "Novice",
    }
}

/// Percentage of `total` over `max`, rounded to two decimals. Zero when `max` is zero.
pub fn percentage(total: i32, max: i32) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    let raw = f64::from(total) / f64::from(max) * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Values picked in an option answer: a single scalar or an array of scalars.
fn selected_values(answer: &Value) -> Option<Vec<String>> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };
    match answer {
        Value::Array(items) => items.iter().map(scalar).collect(),
        other => scalar(other).map(|v| vec![v]),
    }
}

fn is_blank(answer: &Value) -> bool {
    match answer {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn score_question(question: &Question, answer: &Value, field: &str) -> Result<i32, FieldError> {
    if is_blank(answer) {
        return Ok(0);
    }

    let kind = question.kind();
    if !kind.uses_options() || question.options.is_empty() {
        return Ok(question.max_score);
    }

    let values = selected_values(answer)
        .ok_or_else(|| FieldError::new(field, "must be an option value or a list of them"))?;
    if values.len() > 1 && kind != QuestionType::MultipleChoice {
        return Err(FieldError::new(field, "accepts a single option"));
    }

    let mut seen = HashSet::new();
    let mut total = 0i32;
    for value in &values {
        if !seen.insert(value.as_str()) {
            return Err(FieldError::new(field, "lists the same option twice"));
        }
        let option = question
            .options
            .iter()
            .find(|o| o.value == *value)
            .ok_or_else(|| FieldError::new(field, &format!("unknown option: {value}")))?;
        total = total.saturating_add(option.score);
    }
    Ok(total.clamp(0, question.max_score.max(0)))
}

/// score_submission
///
/// Validates and scores `answers` against `questions`. All problems are reported together,
/// in the same shape as body validation errors.
pub fn score_submission(
    questions: &[Question],
    answers: &[AnswerInput],
    passing_score: Option<f64>,
) -> Result<ScoreCard, Vec<FieldError>> {
    let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut errors = Vec::new();
    let mut answered = HashSet::new();
    let mut scored = Vec::with_capacity(answers.len());

    for (i, input) in answers.iter().enumerate() {
        let field = format!("answers[{i}]");
        let Some(question) = by_id.get(&input.question_id) else {
            errors.push(FieldError::new(
                format!("{field}.questionId"),
                "does not belong to this survey",
            ));
            continue;
        };
        if !answered.insert(input.question_id) {
            errors.push(FieldError::new(
                format!("{field}.questionId"),
                "question answered more than once",
            ));
            continue;
        }
        if question.required && is_blank(&input.answer) {
            errors.push(FieldError::new(format!("{field}.answer"), "is required"));
            continue;
        }
        match score_question(question, &input.answer, &format!("{field}.answer")) {
            Ok(score) => scored.push(ScoredAnswer {
                question_id: input.question_id,
                answer: input.answer.clone(),
                score,
                time_spent: input.time_spent,
            }),
            Err(e) => errors.push(e),
        }
    }

    for question in questions.iter().filter(|q| q.required) {
        if !answered.contains(&question.id) {
            errors.push(FieldError::new(
                "answers",
                format!("missing answer for required question {}", question.id),
            ));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let total_score = scored.iter().map(|a| a.score).sum();
    let max_score = questions.iter().map(|q| q.max_score.max(0)).sum();
    let percentage = percentage(total_score, max_score);

    Ok(ScoreCard {
        total_score,
        max_score,
        percentage,
        grade: grade_for(percentage),
        passed: passing_score.map(|threshold| percentage >= threshold),
        answers: scored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionOption;
    use serde_json::json;

    fn option(value: &str, score: i32) -> QuestionOption {
        QuestionOption {
            value: value.into(),
            label: value.into(),
            score,
        }
    }

    fn question(kind: QuestionType, options: Vec<QuestionOption>, max: i32, required: bool) -> Question {
        Question {
            id: Uuid::new_v4(),
            survey_id: Uuid::nil(),
            text: "q".into(),
            question_type: kind.as_str().into(),
            options,
            max_score: max,
            position: 0,
            required,
        }
    }

    fn answer(q: &Question, value: Value) -> AnswerInput {
        AnswerInput {
            question_id: q.id,
            answer: value,
            time_spent: None,
        }
    }

    #[test]
    fn grades() {
        assert_eq!(grade_for(95.0), "Expert");
        assert_eq!(grade_for(80.0), "Advanced");
        assert_eq!(grade_for(79.99), "Intermediate");
        assert_eq!(grade_for(60.0), "Beginner");
        assert_eq!(grade_for(0.0), "Novice");
    }

    #[test]
    fn percentage_rounds_and_handles_zero() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn scores_mixed_question_kinds() {
        let single = question(
            QuestionType::SingleChoice,
            vec![option("low", 1), option("high", 4)],
            4,
            true,
        );
        let multi = question(
            QuestionType::MultipleChoice,
            vec![option("a", 2), option("b", 2), option("c", 2)],
            3,
            true,
        );
        let text = question(QuestionType::Text, vec![], 3, false);
        let questions = vec![single.clone(), multi.clone(), text.clone()];

        let card = score_submission(
            &questions,
            &[
                answer(&single, json!("high")),
                answer(&multi, json!(["a", "b"])),
                answer(&text, json!("We have a data lake")),
            ],
            Some(70.0),
        )
        .unwrap();

        // multi is clamped from 4 to its max of 3
        assert_eq!(card.total_score, 10);
        assert_eq!(card.max_score, 10);
        assert_eq!(card.percentage, 100.0);
        assert_eq!(card.grade, "Expert");
        assert_eq!(card.passed, Some(true));
    }

    #[test]
    fn optional_questions_count_towards_max() {
        let required = question(QuestionType::Scale, vec![option("1", 1), option("5", 5)], 5, true);
        let optional = question(QuestionType::Text, vec![], 5, false);
        let card = score_submission(
            &[required.clone(), optional],
            &[answer(&required, json!(5))],
            None,
        )
        .unwrap();
        assert_eq!(card.percentage, 50.0);
        assert_eq!(card.grade, "Novice");
        assert_eq!(card.passed, None);
    }

    #[test]
    fn rejects_bad_submissions() {
        let single = question(QuestionType::SingleChoice, vec![option("x", 1), option("y", 2)], 2, true);
        let other = question(QuestionType::Text, vec![], 1, true);
        let stranger = question(QuestionType::Text, vec![], 1, true);

        let errors = score_submission(
            &[single.clone(), other.clone()],
            &[
                answer(&single, json!("z")),
                answer(&single, json!("x")),
                answer(&stranger, json!("hi")),
            ],
            None,
        )
        .unwrap_err();

        let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
        assert!(messages.contains(&"unknown option: z".to_string()));
        assert!(messages.contains(&"question answered more than once".to_string()));
        assert!(messages.contains(&"does not belong to this survey".to_string()));
        assert!(messages.iter().any(|m| m.starts_with("missing answer for required question")));
    }

    #[test]
    fn single_choice_takes_one_value() {
        let single = question(QuestionType::SingleChoice, vec![option("x", 1), option("y", 2)], 2, true);
        let errors =
            score_submission(&[single.clone()], &[answer(&single, json!(["x", "y"]))], None).unwrap_err();
        assert_eq!(errors[0].message, "accepts a single option");
    }
}
