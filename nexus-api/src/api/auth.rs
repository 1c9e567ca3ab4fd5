//! Bearer-token authentication for `/api/*`

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use nexus_common::auth::verify_token;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Require `Authorization: Bearer <token>` unless auth is disabled
///
/// Applied to the protected router only; `/health` does not pass through it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.require_auth {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    match verify_token(&state.db, &token).await? {
        Some(token_id) => {
            debug!("Request authorized by token {}", token_id);
            Ok(next.run(request).await)
        }
        None => {
            warn!("Rejected request to {} with unknown token", request.uri().path());
            Err(ApiError::Unauthorized("Invalid token".to_string()))
        }
    }
}
