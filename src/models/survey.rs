use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_enum;
use crate::{
    error::FieldError,
    pagination::PaginationMeta,
    validation::{Validate, Validator},
};

text_enum!(
    SurveyStatus {
        Draft => "DRAFT",
        Active => "ACTIVE",
        Archived => "ARCHIVED",
    }
);

text_enum!(
    QuestionType {
        SingleChoice => "SINGLE_CHOICE",
        MultipleChoice => "MULTIPLE_CHOICE",
        Scale => "SCALE",
        Text => "TEXT",
    }
);

impl QuestionType {
    /// Choice questions are scored from their options; the rest score on presence.
    pub fn uses_options(&self) -> bool {
        !matches!(self, QuestionType::Text)
    }
}

/// One selectable answer and the points it is worth.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Survey {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Minutes.
    pub time_limit: Option<i32>,
    pub max_attempts: Option<i32>,
    /// Percentage required to pass, 0 to 100.
    pub passing_score: Option<f64>,
    pub is_public: bool,
    pub status: String,
    pub total_responses: i32,
    /// Mean percentage across all responses.
    pub average_score: f64,
    pub created_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SurveySummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub survey: Survey,
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Question {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    #[sqlx(json)]
    pub options: Vec<QuestionOption>,
    pub max_score: i32,
    pub position: i32,
    pub required: bool,
}

impl Question {
    pub fn kind(&self) -> QuestionType {
        QuestionType::parse(&self.question_type).unwrap_or(QuestionType::Text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SurveyDetail {
    #[serde(flatten)]
    pub survey: Survey,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveyDetailResponse {
    pub survey: SurveyDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveyListResponse {
    pub surveys: Vec<SurveySummary>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SurveyCreatedResponse {
    pub message: String,
    pub survey: SurveyDetail,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct SurveyFilter {
    pub category: Option<String>,
    /// `true` restricts the listing to public surveys.
    pub public: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateQuestionRequest {
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default = "default_max_score")]
    pub max_score: i32,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_max_score() -> i32 {
    1
}

fn default_required() -> bool {
    true
}

impl Validate for CreateQuestionRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.required("text", &self.text)
            .one_of("type", Some(&self.question_type), QuestionType::ALL)
            .range("maxScore", Some(self.max_score), 0, 1000);

        match QuestionType::parse(&self.question_type) {
            Some(kind) if kind.uses_options() => {
                let mut seen = HashSet::new();
                v.check(self.options.len() >= 2, "options", "must have at least 2 options")
                    .check(
                        self.options.iter().all(|o| seen.insert(o.value.as_str())),
                        "options",
                        "option values must be unique",
                    )
                    .check(
                        self.options
                            .iter()
                            .all(|o| !o.value.trim().is_empty() && !o.label.trim().is_empty()),
                        "options",
                        "options need a value and a label",
                    )
                    .check(
                        self.options
                            .iter()
                            .all(|o| o.score >= 0 && o.score <= self.max_score),
                        "options",
                        "option scores must be between 0 and maxScore",
                    );
            }
            Some(_) => {
                v.check(self.options.is_empty(), "options", "text questions take no options");
            }
            None => {}
        }
        v.finish()
    }
}

/// CreateSurveyRequest
///
/// Admin-authored survey. Created directly in the `ACTIVE` state.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateSurveyRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub time_limit: Option<i32>,
    pub max_attempts: Option<i32>,
    pub passing_score: Option<f64>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub questions: Vec<CreateQuestionRequest>,
}

impl Validate for CreateSurveyRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.required("title", &self.title)
            .max_length("title", Some(&self.title), 200)
            .check(
                self.time_limit.is_none_or(|t| t >= 1),
                "timeLimit",
                "must be at least 1",
            )
            .check(
                self.max_attempts.is_none_or(|a| a >= 1),
                "maxAttempts",
                "must be at least 1",
            )
            .range("passingScore", self.passing_score, 0.0, 100.0)
            .check(!self.questions.is_empty(), "questions", "must contain at least 1 question");
        for (i, question) in self.questions.iter().enumerate() {
            v.nested(&format!("questions[{i}]"), question.validate());
        }
        v.finish()
    }
}

#[derive(Debug, Clone)]
pub struct NewSurvey {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub time_limit: Option<i32>,
    pub max_attempts: Option<i32>,
    pub passing_score: Option<f64>,
    pub is_public: bool,
    pub created_by: Uuid,
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
    pub max_score: i32,
    pub position: i32,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnswerInput {
    pub question_id: Uuid,
    /// An option value, an array of option values, or free text.
    #[schema(value_type = Object)]
    pub answer: serde_json::Value,
    pub time_spent: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SubmitResponseRequest {
    pub survey_id: Uuid,
    pub answers: Vec<AnswerInput>,
    pub device_info: Option<String>,
    pub feedback: Option<String>,
}

impl Validate for SubmitResponseRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.check(!self.answers.is_empty(), "answers", "must contain at least 1 answer")
            .max_length("feedback", self.feedback.as_deref(), 2000);
        for (i, answer) in self.answers.iter().enumerate() {
            v.check(
                answer.time_spent.is_none_or(|t| t >= 0),
                &format!("answers[{i}].timeSpent"),
                "must not be negative",
            );
        }
        v.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub grade: String,
    pub passed: Option<bool>,
    pub device_info: Option<String>,
    pub feedback: Option<String>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub response_id: Uuid,
    pub question_id: Uuid,
    #[schema(value_type = Object)]
    pub answer: serde_json::Value,
    pub score: i32,
    pub time_spent: Option<i32>,
}

/// A response row joined with the survey it answers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MyResponseView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub response: SurveyResponse,
    pub survey_title: String,
    pub survey_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MyResponsesResponse {
    pub responses: Vec<MyResponseView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResponseResult {
    pub id: Uuid,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub grade: String,
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SubmitResponseResponse {
    pub message: String,
    pub response: ResponseResult,
}

/// A fully scored submission ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewSurveyResponse {
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub grade: String,
    pub passed: Option<bool>,
    pub device_info: Option<String>,
    pub feedback: Option<String>,
    pub answers: Vec<ScoredAnswer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAnswer {
    pub question_id: Uuid,
    pub answer: serde_json::Value,
    pub score: i32,
    pub time_spent: Option<i32>,
}
