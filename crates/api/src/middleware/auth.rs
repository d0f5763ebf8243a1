use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use notifyhub_core::auth::hash_api_key;
use notifyhub_core::types::Role;
use notifyhub_db::models::ApiKeyStatus;

use crate::{
    error::{ApiError, AppError},
    state::{AppState, RequestId},
};

/// Verified caller identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub key_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
}

impl AuthContext {
    pub fn require_admin(&self, request_id: &RequestId) -> Result<(), ApiError> {
        if self.role != Role::Admin {
            return Err(AppError::Forbidden("Organization admin role required".to_string())
                .with_request_id(&request_id.0));
        }
        Ok(())
    }
}

pub async fn api_key_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let unauthorized = || AppError::Unauthorized.with_request_id(&request_id);

    let token = presented_key(req.headers()).ok_or_else(unauthorized)?;
    let store = state.engine.store();

    let record = store
        .find_api_key(&hash_api_key(token))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "api key lookup failed");
            AppError::Internal.with_request_id(&request_id)
        })?
        .filter(|key| key.status == ApiKeyStatus::Active)
        .ok_or_else(unauthorized)?;

    if let Err(err) = store.touch_api_key(&record.id).await {
        tracing::warn!(key_id = %record.id, error = %err, "failed to touch api key");
    }

    req.extensions_mut().insert(AuthContext {
        key_id: record.id,
        tenant_id: record.tenant_id,
        user_id: record.user_id,
        role: record.role,
    });

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <key>` or `X-Api-Key: <key>`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        return (scheme == "Bearer" && !token.is_empty()).then_some(token);
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
