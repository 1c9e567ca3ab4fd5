//! /api/leads

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use nexus_common::conversion::{self, Conversion, ConvertLead};
use nexus_common::models::{EntityType, Lead, LeadFilter, LeadPatch, NewLead};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{optional_json, ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_leads(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<LeadFilter>,
) -> ApiResult<Json<Page<Lead>>> {
    Ok(Json(Lead::list(&state.db, &filter, &params).await?))
}

pub async fn create_lead(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewLead>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = Lead::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Lead, lead.id));
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn get_lead(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(Lead::get(&state.db, id).await?))
}

pub async fn update_lead(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<LeadPatch>,
) -> ApiResult<Json<Lead>> {
    let lead = Lead::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Lead, id));
    Ok(Json(lead))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Lead::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Lead, id));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/leads/:id/convert
pub async fn convert_lead(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Conversion>)> {
    let opts: ConvertLead = optional_json(&body)?;
    let result = conversion::convert_lead(&state.db, id, opts).await?;
    state.events.emit(result.event());
    Ok((StatusCode::CREATED, Json(result)))
}
