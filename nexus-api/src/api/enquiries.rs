//! /api/enquiries

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use nexus_common::conversion::{self, ConvertEnquiry, Conversion};
use nexus_common::models::{EntityType, Enquiry, EnquiryFilter, EnquiryPatch, NewEnquiry};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{optional_json, ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_enquiries(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<EnquiryFilter>,
) -> ApiResult<Json<Page<Enquiry>>> {
    Ok(Json(Enquiry::list(&state.db, &filter, &params).await?))
}

pub async fn create_enquiry(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewEnquiry>,
) -> ApiResult<(StatusCode, Json<Enquiry>)> {
    let enquiry = Enquiry::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Enquiry, enquiry.id));
    Ok((StatusCode::CREATED, Json(enquiry)))
}

pub async fn get_enquiry(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Enquiry>> {
    Ok(Json(Enquiry::get(&state.db, id).await?))
}

pub async fn update_enquiry(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<EnquiryPatch>,
) -> ApiResult<Json<Enquiry>> {
    let enquiry = Enquiry::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Enquiry, id));
    Ok(Json(enquiry))
}

pub async fn delete_enquiry(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Enquiry::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Enquiry, id));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/enquiries/:id/convert
///
/// Body is optional; an empty body converts with defaults.
pub async fn convert_enquiry(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Conversion>)> {
    let opts: ConvertEnquiry = optional_json(&body)?;
    let result = conversion::convert_enquiry(&state.db, id, opts).await?;
    state.events.emit(result.event());
    Ok((StatusCode::CREATED, Json(result)))
}
