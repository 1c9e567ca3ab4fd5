//! /api/documents
//!
//! Uploads are raw request bodies; metadata comes from the query string and
//! the `Content-Type` header.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use nexus_common::models::{Document, EntityType, NewDocument};
use nexus_common::CrmEvent;
use serde::Deserialize;
use std::io::ErrorKind;
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::{ApiPath, ApiQuery};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct EntityParams {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
}

/// POST /api/documents?entity_type=&entity_id=&file_name=
pub async fn upload_document(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<UploadParams>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let max = state.documents.max_upload_bytes();
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!("Upload exceeds {} bytes", max))
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if body.len() > max {
        return Err(ApiError::PayloadTooLarge(format!("Upload exceeds {} bytes", max)));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Upload body is empty".to_string()));
    }

    Document::check_target(&state.db, params.entity_type, params.entity_id).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let id = Uuid::new_v4();
    let sha256 = state.documents.write(id, &body).await?;

    let created = Document::create(
        &state.db,
        NewDocument {
            id,
            entity_type: params.entity_type,
            entity_id: params.entity_id,
            file_name: params.file_name,
            content_type,
            size_bytes: body.len() as i64,
            sha256,
        },
    )
    .await;

    let document = match created {
        Ok(document) => document,
        Err(e) => {
            state.documents.remove(id).await?;
            return Err(e.into());
        }
    };

    info!(
        "Stored document {} ({}, {} bytes) on {} {}",
        document.id, document.file_name, document.size_bytes, document.entity_type, document.entity_id
    );
    state.events.emit(CrmEvent::created(EntityType::Document, document.id));
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents?entity_type=&entity_id=
pub async fn list_documents(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<EntityParams>,
) -> ApiResult<Json<Vec<Document>>> {
    let documents =
        Document::list_for_entity(&state.db, params.entity_type, params.entity_id).await?;
    Ok(Json(documents))
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Document>> {
    Ok(Json(Document::get(&state.db, id).await?))
}

/// GET /api/documents/:id/content
pub async fn download_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    let document = Document::get(&state.db, id).await?;
    let bytes = state.documents.read(id).await.map_err(|e| match e {
        ApiError::Io(io) if io.kind() == ErrorKind::NotFound => {
            warn!("Document {} has metadata but no file", id);
            ApiError::NotFound(format!("content of document {}", id))
        }
        other => other,
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.file_name.replace(['"', '\\'], "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    Document::delete(&state.db, id).await?;
    state.documents.remove(id).await?;
    state.events.emit(CrmEvent::deleted(EntityType::Document, id));
    Ok(StatusCode::NO_CONTENT)
}
