use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiResult, WithRequestId},
    middleware::auth::AuthContext,
    state::{AppState, RequestId},
};
use notifyhub_core::types::{Channel, LogStatus};
use notifyhub_db::models::{DeliveryLog, LogFilter};
use notifyhub_engine::dispatch::{DispatchReport, SendRequest, SendToAllRequest, UsageSummary};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications/send", post(send))
        .route("/notifications/send-to-all", post(send_to_all))
        .route("/notifications/send-now", post(send_now))
        .route("/notifications/logs", get(list_logs))
        .route("/usage/me", get(usage))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendNowRequest {
    log_id: String,
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    channel: Option<Channel>,
    status: Option<LogStatus>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListLogsResponse {
    items: Vec<DeliveryLog>,
}

async fn send(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<SendRequest>,
) -> ApiResult<Json<DispatchReport>> {
    let report = state
        .engine
        .send_notification(&auth.tenant_id, Some(&auth.user_id), req, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(report))
}

async fn send_to_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<SendToAllRequest>,
) -> ApiResult<Json<DispatchReport>> {
    let report = state
        .engine
        .send_to_all(&auth.tenant_id, Some(&auth.user_id), req, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(report))
}

async fn send_now(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<SendNowRequest>,
) -> ApiResult<Json<DeliveryLog>> {
    let log = state
        .engine
        .send_now(&auth.tenant_id, &req.log_id, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(log))
}

async fn list_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<ListLogsResponse>> {
    let filter = LogFilter {
        channel: query.channel,
        status: query.status,
        limit: query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT),
    };
    let items = state
        .engine
        .list_logs(&auth.tenant_id, &filter)
        .await
        .or_request(&request_id)?;
    Ok(Json(ListLogsResponse { items }))
}

async fn usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<UsageSummary>> {
    let summary = state
        .engine
        .usage(&auth.tenant_id)
        .await
        .or_request(&request_id)?;
    Ok(Json(summary))
}
