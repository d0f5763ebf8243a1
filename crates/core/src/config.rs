use serde::Deserialize;

use crate::credits::Credits;
use crate::providers::ProviderDefaults;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub notifyhub_env: String,
    pub api_bind: String,
    pub rate_limit_per_min: u32,
    pub tokens_per_unit: Credits,
    pub scheduler_interval_secs: u64,
    pub scheduler_batch: i64,
    pub campaign_interval_secs: u64,
    pub session_ttl_minutes: i64,
    pub mpesa_callback_url: Option<String>,
    pub mpesa_callback_token: Option<String>,
    #[serde(skip)]
    pub providers: ProviderDefaults,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("NOTIFYHUB_DATABASE_URL"))?;
        let redis_url = optional("REDIS_URL").or_else(|| optional("NOTIFYHUB_REDIS_URL"));
        let notifyhub_env = std::env::var("NOTIFYHUB_ENV").unwrap_or_else(|_| "dev".to_string());
        let api_bind =
            std::env::var("NOTIFYHUB_API_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            database_url,
            redis_url,
            notifyhub_env,
            api_bind,
            rate_limit_per_min: parsed("NOTIFYHUB_RATE_LIMIT_PER_MIN", 600),
            tokens_per_unit: Credits::from_f64(parsed("NOTIFYHUB_TOKENS_PER_UNIT", 1.0)),
            scheduler_interval_secs: parsed("NOTIFYHUB_SCHEDULER_INTERVAL_SECS", 60),
            scheduler_batch: parsed("NOTIFYHUB_SCHEDULER_BATCH", 100),
            campaign_interval_secs: parsed("NOTIFYHUB_CAMPAIGN_INTERVAL_SECS", 300),
            session_ttl_minutes: parsed("NOTIFYHUB_SESSION_TTL_MINUTES", 1440),
            mpesa_callback_url: optional("MPESA_CALLBACK_URL"),
            mpesa_callback_token: optional("MPESA_CALLBACK_TOKEN"),
            providers: ProviderDefaults::from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.notifyhub_env == "production" || self.notifyhub_env == "prod"
    }
}
