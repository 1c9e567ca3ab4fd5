//! /api/accounts

use axum::{extract::State, http::StatusCode, Json};
use nexus_common::models::{
    Account, AccountFilter, AccountPatch, Contact, ContactFilter, EntityType, NewAccount,
};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/accounts
pub async fn list_accounts(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<AccountFilter>,
) -> ApiResult<Json<Page<Account>>> {
    Ok(Json(Account::list(&state.db, &filter, &params).await?))
}

/// POST /api/accounts
pub async fn create_account(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewAccount>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = Account::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Account, account.id));
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/:id
pub async fn get_account(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Account>> {
    Ok(Json(Account::get(&state.db, id).await?))
}

/// PATCH /api/accounts/:id
pub async fn update_account(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<AccountPatch>,
) -> ApiResult<Json<Account>> {
    let account = Account::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Account, id));
    Ok(Json(account))
}

/// DELETE /api/accounts/:id
pub async fn delete_account(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Account::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Account, id));
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/accounts/:id/contacts
pub async fn list_account_contacts(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Page<Contact>>> {
    Account::get(&state.db, id).await?;
    let filter = ContactFilter {
        account_id: Some(id),
        ..Default::default()
    };
    Ok(Json(Contact::list(&state.db, &filter, &params).await?))
}
