use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::{ApiResult, WithRequestId},
    middleware::auth::AuthContext,
    state::{AppState, RequestId},
};
use notifyhub_core::types::CampaignAnalytics;
use notifyhub_db::models::Campaign;
use notifyhub_engine::campaigns::{CreateCampaign, Launch};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/{id}", get(get_campaign))
        .route("/campaigns/{id}/launch", post(launch_campaign))
        .route("/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/campaigns/{id}/analytics", get(campaign_analytics))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ListCampaignsResponse {
    items: Vec<Campaign>,
}

async fn create_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<CreateCampaign>,
) -> ApiResult<Json<Campaign>> {
    let campaign = state
        .engine
        .create_campaign(&auth.tenant_id, &auth.user_id, req, Utc::now())
        .await
        .or_request(&request_id)?;

    tracing::info!(campaign_id = %campaign.id, status = ?campaign.status, "campaign created");
    Ok(Json(campaign))
}

async fn list_campaigns(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<ListCampaignsResponse>> {
    let items = state
        .engine
        .list_campaigns(&auth.tenant_id)
        .await
        .or_request(&request_id)?;
    Ok(Json(ListCampaignsResponse { items }))
}

async fn get_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Campaign>> {
    let campaign = state
        .engine
        .get_campaign(&auth.tenant_id, &id)
        .await
        .or_request(&request_id)?;
    Ok(Json(campaign))
}

async fn launch_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Launch>> {
    let launch = state
        .engine
        .launch_campaign(&auth.tenant_id, &id, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(launch))
}

async fn cancel_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Campaign>> {
    let campaign = state
        .engine
        .cancel_campaign(&auth.tenant_id, &id, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(campaign))
}

async fn campaign_analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Json<CampaignAnalytics>> {
    let analytics = state
        .engine
        .campaign_analytics(&auth.tenant_id, &id, Utc::now())
        .await
        .or_request(&request_id)?;
    Ok(Json(analytics))
}
