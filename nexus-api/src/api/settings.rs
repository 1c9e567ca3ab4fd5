//! /api/settings

use axum::{extract::State, Json};
use nexus_common::db::settings::{list_settings, update_setting};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::extract::{ApiJson, ApiPath};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, String>>> {
    Ok(Json(list_settings(&state.db).await?))
}

/// PUT /api/settings/:key
pub async fn put_setting(
    State(state): State<AppState>,
    ApiPath(key): ApiPath<String>,
    ApiJson(body): ApiJson<SettingValue>,
) -> ApiResult<Json<Setting>> {
    let value = update_setting(&state.db, &key, &body.value).await?;
    info!("Setting {} changed to {}", key, value);
    Ok(Json(Setting { key, value }))
}
