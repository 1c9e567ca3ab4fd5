//! /api/activities

use axum::{extract::State, http::StatusCode, Json};
use nexus_common::models::{Activity, ActivityFilter, ActivityPatch, EntityType, NewActivity};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_activities(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<ActivityFilter>,
) -> ApiResult<Json<Page<Activity>>> {
    Ok(Json(Activity::list(&state.db, &filter, &params).await?))
}

pub async fn create_activity(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewActivity>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let activity = Activity::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Activity, activity.id));
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn get_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Activity>> {
    Ok(Json(Activity::get(&state.db, id).await?))
}

pub async fn update_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ActivityPatch>,
) -> ApiResult<Json<Activity>> {
    let activity = Activity::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Activity, id));
    Ok(Json(activity))
}

/// POST /api/activities/:id/complete
pub async fn complete_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Activity>> {
    let activity = Activity::complete(&state.db, id).await?;
    state.events.emit(CrmEvent::updated(EntityType::Activity, id));
    Ok(Json(activity))
}

/// POST /api/activities/:id/reopen
pub async fn reopen_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Activity>> {
    let activity = Activity::reopen(&state.db, id).await?;
    state.events.emit(CrmEvent::updated(EntityType::Activity, id));
    Ok(Json(activity))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Activity::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Activity, id));
    Ok(StatusCode::NO_CONTENT)
}
