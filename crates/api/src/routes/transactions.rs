use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiResult, AppError, WithRequestId},
    middleware::auth::AuthContext,
    state::{AppState, RequestId},
};
use notifyhub_core::auth::secrets_match;
use notifyhub_core::mpesa::{CallbackAck, CallbackEnvelope, GatewayCallback};
use notifyhub_db::models::Transaction;
use notifyhub_engine::payments::{PaymentStarted, PurchaseRequest};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/purchase", post(purchase))
        .route("/transactions/{id}", get(get_transaction))
        .with_state(state)
}

/// Gateway-invoked and unauthenticated. Mounted outside the API key layer.
pub fn callback_router(state: AppState) -> Router {
    Router::new()
        .route("/transactions/callback", post(callback))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListTransactionsResponse {
    items: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    token: Option<String>,
}

async fn purchase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Json<PaymentStarted>> {
    let started = state
        .engine
        .initiate_payment(&auth.tenant_id, Some(&auth.user_id), req, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(started))
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListTransactionsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let items = state
        .engine
        .list_transactions(&auth.tenant_id, limit)
        .await
        .or_request(&request_id)?;
    Ok(Json(ListTransactionsResponse { items }))
}

async fn get_transaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let txn = state
        .engine
        .get_transaction(&auth.tenant_id, &id)
        .await
        .or_request(&request_id)?;
    Ok(Json(txn))
}

async fn callback(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<CallbackQuery>,
    Json(envelope): Json<CallbackEnvelope>,
) -> ApiResult<Json<CallbackAck>> {
    if let Some(expected) = state.settings.mpesa_callback_token.as_deref() {
        let provided = query.token.as_deref().unwrap_or_default();
        if !secrets_match(expected, provided) {
            tracing::warn!("payment callback with bad token");
            return Err(AppError::Unauthorized.with_request_id(&request_id.0));
        }
    }

    let callback = GatewayCallback::from(envelope);
    tracing::info!(
        checkout_request_id = %callback.checkout_request_id,
        result_code = callback.result_code,
        "payment callback received"
    );

    let ack = state
        .engine
        .handle_payment_callback(callback, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(ack))
}
