//! /api/contacts

use axum::{extract::State, http::StatusCode, Json};
use nexus_common::models::{Contact, ContactFilter, ContactPatch, EntityType, NewContact};
use nexus_common::pagination::{ListParams, Page};
use nexus_common::CrmEvent;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::AppState;

pub async fn list_contacts(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<ContactFilter>,
) -> ApiResult<Json<Page<Contact>>> {
    Ok(Json(Contact::list(&state.db, &filter, &params).await?))
}

pub async fn create_contact(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<NewContact>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    let contact = Contact::create(&state.db, data).await?;
    state.events.emit(CrmEvent::created(EntityType::Contact, contact.id));
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn get_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Contact>> {
    Ok(Json(Contact::get(&state.db, id).await?))
}

pub async fn update_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<ContactPatch>,
) -> ApiResult<Json<Contact>> {
    let contact = Contact::update(&state.db, id, patch).await?;
    state.events.emit(CrmEvent::updated(EntityType::Contact, id));
    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Contact::delete(&state.db, id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Contact, id));
    Ok(StatusCode::NO_CONTENT)
}
