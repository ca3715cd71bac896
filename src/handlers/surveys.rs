use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    models::{
        CreateSurveyRequest, MyResponsesResponse, NewQuestion, NewSurvey, NewSurveyResponse,
        QuestionType, ResponseResult, SubmitResponseRequest, SubmitResponseResponse, Survey,
        SurveyCreatedResponse, SurveyDetail, SurveyDetailResponse, SurveyFilter,
        SurveyListResponse, SurveyStatus,
    },
    pagination::PageQuery,
    sanitize::{strip_tags, strip_tags_opt},
    scoring::score_submission,
    validation::ValidatedJson,
};

const DEFAULT_PAGE_SIZE: i64 = 20;

async fn active_survey(state: &AppState, id: Uuid) -> ApiResult<Survey> {
    let survey = state
        .repo
        .find_survey(id)
        .await?
        .ok_or_else(|| ApiError::not_found("SURVEY_NOT_FOUND", "Survey not found"))?;
    if survey.status != SurveyStatus::Active.as_str() {
        return Err(ApiError::not_found(
            "SURVEY_UNAVAILABLE",
            "Survey is not available",
        ));
    }
    Ok(survey)
}

/// list_surveys
///
/// Active surveys with their question counts.
#[utoipa::path(
    get,
    path = "/api/v1/ai-readiness/surveys",
    params(SurveyFilter, PageQuery),
    responses((status = 200, description = "Active surveys", body = SurveyListResponse))
)]
pub async fn list_surveys(
    State(state): State<AppState>,
    Query(filter): Query<SurveyFilter>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<SurveyListResponse>> {
    let page = paging.resolve(DEFAULT_PAGE_SIZE);
    let category = filter
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let public_only = filter.public.as_deref() == Some("true");
    let (surveys, total) = state.repo.list_surveys(category, public_only, page).await?;
    Ok(Json(SurveyListResponse {
        surveys,
        pagination: page.meta(total),
    }))
}

/// get_survey
#[utoipa::path(
    get,
    path = "/api/v1/ai-readiness/surveys/{id}",
    params(("id" = Uuid, Path, description = "Survey ID")),
    responses(
        (status = 200, description = "Survey with questions", body = SurveyDetailResponse),
        (status = 404, description = "Survey not found or unavailable")
    )
)]
pub async fn get_survey(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SurveyDetailResponse>> {
    let survey = active_survey(&state, id).await?;
    let questions = state.repo.survey_questions(id).await?;
    Ok(Json(SurveyDetailResponse {
        survey: SurveyDetail { survey, questions },
    }))
}

/// create_survey
///
/// Admin-authored survey, live as soon as it is stored. Question order follows the payload.
#[utoipa::path(
    post,
    path = "/api/v1/ai-readiness/surveys",
    request_body = CreateSurveyRequest,
    responses(
        (status = 201, description = "Survey created", body = SurveyCreatedResponse),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_survey(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateSurveyRequest>,
) -> ApiResult<(StatusCode, Json<SurveyCreatedResponse>)> {
    let questions = req
        .questions
        .into_iter()
        .enumerate()
        .map(|(position, q)| NewQuestion {
            text: strip_tags(&q.text),
            question_type: QuestionType::parse(&q.question_type).unwrap_or(QuestionType::Text),
            options: q.options,
            max_score: q.max_score,
            position: position as i32,
            required: q.required,
        })
        .collect();

    let survey = state
        .repo
        .create_survey(NewSurvey {
            title: strip_tags(&req.title),
            description: strip_tags_opt(req.description),
            category: strip_tags_opt(req.category),
            time_limit: req.time_limit,
            max_attempts: req.max_attempts,
            passing_score: req.passing_score,
            is_public: req.is_public,
            created_by: admin.id,
            questions,
        })
        .await?;

    tracing::info!(survey_id = %survey.survey.id, admin_id = %admin.id, "survey created");
    Ok((
        StatusCode::CREATED,
        Json(SurveyCreatedResponse {
            message: "Survey created successfully".to_string(),
            survey,
        }),
    ))
}

/// submit_response
///
/// Scores a completed survey and stores the result.
#[utoipa::path(
    post,
    path = "/api/v1/ai-readiness/responses",
    request_body = SubmitResponseRequest,
    responses(
        (status = 201, description = "Response scored", body = SubmitResponseResponse),
        (status = 400, description = "Invalid answers"),
        (status = 404, description = "Survey not found or unavailable"),
        (status = 409, description = "Attempt limit reached")
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_response(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SubmitResponseRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponseResponse>)> {
    let survey = active_survey(&state, req.survey_id).await?;

    if let Some(max_attempts) = survey.max_attempts {
        let attempts = state
            .repo
            .count_user_responses(survey.id, user_id)
            .await?;
        if attempts >= i64::from(max_attempts) {
            return Err(ApiError::conflict(
                "MAX_ATTEMPTS_REACHED",
                "Maximum attempts reached for this survey",
            ));
        }
    }

    let questions = state.repo.survey_questions(survey.id).await?;
    let card = score_submission(&questions, &req.answers, survey.passing_score)
        .map_err(ApiError::Validation)?;

    let response = state
        .repo
        .record_survey_response(NewSurveyResponse {
            survey_id: survey.id,
            user_id,
            total_score: card.total_score,
            max_score: card.max_score,
            percentage: card.percentage,
            grade: card.grade.to_string(),
            passed: card.passed,
            device_info: req.device_info,
            feedback: strip_tags_opt(req.feedback),
            answers: card.answers,
        })
        .await?;

    tracing::info!(
        response_id = %response.id,
        survey_id = %survey.id,
        percentage = response.percentage,
        "survey completed"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponseResponse {
            message: "Survey completed successfully".to_string(),
            response: ResponseResult {
                id: response.id,
                total_score: response.total_score,
                max_score: response.max_score,
                percentage: response.percentage,
                grade: response.grade,
                passed: response.passed,
            },
        }),
    ))
}

/// my_responses
///
/// The caller's own submissions, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/ai-readiness/responses/my",
    responses((status = 200, description = "Own responses", body = MyResponsesResponse)),
    security(("bearer_auth" = []))
)]
pub async fn my_responses(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<MyResponsesResponse>> {
    let responses = state.repo.list_user_responses(id).await?;
    Ok(Json(MyResponsesResponse { responses }))
}
