use notifyhub_core::config::Settings;
use notifyhub_engine::Engine;
use redis::Client as RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Rate limiting is enabled only when a Redis URL is configured.
    pub redis: Option<RedisClient>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(engine: Engine, redis: Option<RedisClient>, settings: Settings) -> Self {
        Self {
            engine,
            redis,
            settings: Arc::new(settings),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);
