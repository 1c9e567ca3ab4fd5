//! /api/deals

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use nexus_common::conversion::{self, Conversion, ConvertDeal};
use nexus_common::models::{Deal, DealFilter, DealPatch, EntityType, NewDeal, StageChange};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{optional_json, ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_deals(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<DealFilter>,
) -> ApiResult<Json<Page<Deal>>> {
    Ok(Json(Deal::list(&state.db, &filter, &params).await?))
}

pub async fn create_deal(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewDeal>,
) -> ApiResult<(StatusCode, Json<Deal>)> {
    let deal = Deal::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Deal, deal.id));
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn get_deal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Deal>> {
    Ok(Json(Deal::get(&state.db, id).await?))
}

pub async fn update_deal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<DealPatch>,
) -> ApiResult<Json<Deal>> {
    let deal = Deal::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Deal, id));
    Ok(Json(deal))
}

/// POST /api/deals/:id/stage
pub async fn change_deal_stage(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<StageChange>,
) -> ApiResult<Json<Deal>> {
    let deal = Deal::change_stage(&state.db, id, change).await?;
    state.events.emit(CrmEvent::updated(EntityType::Deal, id));
    Ok(Json(deal))
}

pub async fn delete_deal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Deal::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Deal, id));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/deals/:id/convert
pub async fn convert_deal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Conversion>)> {
    let opts: ConvertDeal = optional_json(&body)?;
    let result = conversion::convert_deal(&state.db, id, opts).await?;
    state.events.emit(result.event());
    Ok((StatusCode::CREATED, Json(result)))
}
