pub mod campaigns;
pub mod health;
pub mod notifications;
pub mod sessions;
pub mod transactions;

use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};

use crate::middleware::{auth::api_key_auth, rate_limit::rate_limit, request_id::request_id};
use crate::state::AppState;

/// Routes that require an API key. Auth runs before the limiter so buckets
/// are keyed per key.
pub fn tenant_router(state: AppState) -> Router {
    Router::new()
        .merge(notifications::router(state.clone()))
        .merge(campaigns::router(state.clone()))
        .merge(transactions::router(state.clone()))
        .merge(sessions::router(state.clone()))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state, api_key_auth))
}

pub fn public_router(state: AppState) -> Router {
    Router::new()
        .merge(transactions::callback_router(state.clone()))
        .merge(sessions::public_router(state.clone()))
        .layer(from_fn_with_state(state, rate_limit))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(public_router(state.clone()))
        .merge(tenant_router(state))
        .layer(from_fn(request_id))
}
