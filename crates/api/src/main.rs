use std::net::SocketAddr;
use std::sync::Arc;

use notifyhub_api::{build_router, AppState};
use notifyhub_core::config::Settings;
use notifyhub_db::PgStore;
use notifyhub_engine::providers::{http_client, Providers};
use notifyhub_engine::{Engine, EngineConfig, MpesaGateway};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;
    if settings.mpesa_callback_url.is_none() {
        tracing::warn!("MPESA_CALLBACK_URL is not set; top-ups will be rejected");
    }

    let store = PgStore::connect(&settings.database_url, 10).await?;
    let redis = settings
        .redis_url
        .as_deref()
        .map(redis::Client::open)
        .transpose()?;
    if redis.is_none() {
        info!("rate limiting disabled, no redis configured");
    }

    let client = http_client()?;
    let engine = Engine::new(
        Arc::new(store),
        Providers::http(client.clone()),
        Arc::new(MpesaGateway::new(client)),
        EngineConfig::from_settings(&settings),
    );

    let addr: SocketAddr = settings.api_bind.parse()?;
    let env = settings.notifyhub_env.clone();
    let app = build_router(AppState::new(engine, redis, settings));

    info!(%addr, %env, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
