//! /api/dashboard and /api/reports/*

use axum::{extract::State, Json};
use chrono::Datelike;
use nexus_common::reports::{
    self, ActivityKindTotal, Dashboard, JobStatusTotal, MonthRevenue, SourceTotal, StageTotal,
};
use nexus_common::time;
use serde::Deserialize;

use super::extract::ApiQuery;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct YearParams {
    /// Defaults to the current year
    pub year: Option<i32>,
}

pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Json<Dashboard>> {
    Ok(Json(reports::dashboard(&state.db).await?))
}

pub async fn pipeline_report(State(state): State<AppState>) -> ApiResult<Json<Vec<StageTotal>>> {
    Ok(Json(reports::pipeline_by_stage(&state.db).await?))
}

pub async fn lead_source_report(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SourceTotal>>> {
    Ok(Json(reports::lead_sources(&state.db).await?))
}

pub async fn job_status_report(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<JobStatusTotal>>> {
    Ok(Json(reports::jobs_by_status(&state.db).await?))
}

pub async fn revenue_report(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<YearParams>,
) -> ApiResult<Json<Vec<MonthRevenue>>> {
    let year = params.year.unwrap_or_else(|| time::now().year());
    Ok(Json(reports::revenue_by_month(&state.db, year).await?))
}

pub async fn activity_report(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ActivityKindTotal>>> {
    Ok(Json(reports::activity_summary(&state.db).await?))
}
