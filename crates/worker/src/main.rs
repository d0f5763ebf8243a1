use anyhow::Result;
use notifyhub_core::config::Settings;
use notifyhub_db::PgStore;
use notifyhub_engine::providers::{http_client, Providers};
use notifyhub_engine::{Engine, EngineConfig, MpesaGateway};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

mod jobs;

#[derive(Clone)]
pub struct WorkerState {
    pub engine: Engine,
    pub settings: Arc<Settings>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;
    let store = PgStore::connect(&settings.database_url, 5).await?;
    let client = http_client()?;

    let state = WorkerState {
        engine: Engine::new(
            Arc::new(store),
            Providers::http(client.clone()),
            Arc::new(MpesaGateway::new(client)),
            EngineConfig::from_settings(&settings),
        ),
        settings: Arc::new(settings),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduled = tokio::spawn(jobs::scheduled::run(state.clone(), shutdown_rx.clone()));
    let campaigns = tokio::spawn(jobs::campaigns::run(state, shutdown_rx));

    info!("worker starting");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, finishing current ticks");
    shutdown_tx.send(true)?;

    scheduled.await?;
    campaigns.await?;
    Ok(())
}
