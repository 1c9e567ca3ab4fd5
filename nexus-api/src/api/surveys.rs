//! /api/surveys

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use nexus_common::models::{
    EntityType, NewSurvey, Survey, SurveyCompletion, SurveyFilter, SurveyPatch,
};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{optional_json, ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_surveys(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<SurveyFilter>,
) -> ApiResult<Json<Page<Survey>>> {
    Ok(Json(Survey::list(&state.db, &filter, &params).await?))
}

pub async fn create_survey(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewSurvey>,
) -> ApiResult<(StatusCode, Json<Survey>)> {
    let survey = Survey::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Survey, survey.id));
    Ok((StatusCode::CREATED, Json(survey)))
}

pub async fn get_survey(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Survey>> {
    Ok(Json(Survey::get(&state.db, id).await?))
}

pub async fn update_survey(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<SurveyPatch>,
) -> ApiResult<Json<Survey>> {
    let survey = Survey::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Survey, id));
    Ok(Json(survey))
}

/// POST /api/surveys/:id/complete
pub async fn complete_survey(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Survey>> {
    let completion: SurveyCompletion = optional_json(&body)?;
    let survey = Survey::complete(&state.db, id, completion).await?;
    state.events.emit(CrmEvent::updated(EntityType::Survey, id));
    Ok(Json(survey))
}

/// POST /api/surveys/:id/cancel
pub async fn cancel_survey(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Survey>> {
    let survey = Survey::cancel(&state.db, id).await?;
    state.events.emit(CrmEvent::updated(EntityType::Survey, id));
    Ok(Json(survey))
}

pub async fn delete_survey(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Survey::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Survey, id));
    Ok(StatusCode::NO_CONTENT)
}
