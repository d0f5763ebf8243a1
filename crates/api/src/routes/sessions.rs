use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{ApiResult, WithRequestId},
    middleware::auth::AuthContext,
    state::{AppState, RequestId},
};
use notifyhub_core::types::{SessionMode, SessionStatus};
use notifyhub_engine::sessions::{CreateSession, PublicSession, SessionPayment};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payment-sessions", post(create_session))
        .with_state(state)
}

/// Reachable with nothing but the session token.
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/public/pay/{token}", get(view_session))
        .route("/public/pay/{token}/initiate", post(initiate))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    token: String,
    mode: SessionMode,
    status: SessionStatus,
    expires_at: DateTime<Utc>,
}

/// What an anonymous payer may see about the charge they started.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionPaymentStarted {
    transaction_id: String,
    checkout_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_message: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<CreateSession>,
) -> ApiResult<Json<CreateSessionResponse>> {
    auth.require_admin(&request_id)?;

    let session = state
        .engine
        .create_session(&auth.tenant_id, &auth.user_id, req, Utc::now())
        .await
        .or_request(&request_id)?;

    Ok(Json(CreateSessionResponse {
        token: session.token,
        mode: session.mode,
        status: session.status,
        expires_at: session.expires_at,
    }))
}

async fn view_session(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(token): Path<String>,
) -> ApiResult<Json<PublicSession>> {
    let session = state
        .engine
        .public_session(&token, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(session))
}

async fn initiate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(token): Path<String>,
    Json(req): Json<SessionPayment>,
) -> ApiResult<Json<SessionPaymentStarted>> {
    let started = state
        .engine
        .initiate_session_payment(&token, req, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(SessionPaymentStarted {
        transaction_id: started.transaction.id,
        checkout_request_id: started.transaction.checkout_request_id,
        customer_message: started.customer_message,
    }))
}
