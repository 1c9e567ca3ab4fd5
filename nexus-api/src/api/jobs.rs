//! /api/jobs

use axum::{extract::State, http::StatusCode, Json};
use nexus_common::models::{EntityType, Job, JobFilter, JobPatch, NewJob};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_jobs(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<JobFilter>,
) -> ApiResult<Json<Page<Job>>> {
    Ok(Json(Job::list(&state.db, &filter, &params).await?))
}

pub async fn create_job(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = Job::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Job, job.id));
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Job>> {
    Ok(Json(Job::get(&state.db, id).await?))
}

/// PATCH /api/jobs/:id
///
/// A `status` change must follow the job lifecycle or the request is a 409.
pub async fn update_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<JobPatch>,
) -> ApiResult<Json<Job>> {
    let job = Job::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Job, id));
    Ok(Json(job))
}

pub async fn delete_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Job::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Job, id));
    Ok(StatusCode::NO_CONTENT)
}
