//! Credit-metered dispatch and payment settlement.
//!
//! [`Engine`] is the single entry point used by the API and the worker. Its
//! operations are spread over the modules below as separate `impl` blocks.

use notifyhub_core::config::Settings;
use notifyhub_core::credits::Credits;
use notifyhub_core::providers::ProviderDefaults;
use notifyhub_db::Store;
use std::sync::Arc;

pub mod admission;
pub mod campaigns;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod payments;
pub mod providers;
pub mod scheduler;
pub mod sessions;

pub use admission::{Admission, Reservation};
pub use error::{EngineError, EngineResult};
pub use gateway::{MpesaGateway, PaymentGateway};
pub use ledger::Ledger;
pub use providers::Providers;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provider_defaults: ProviderDefaults,
    /// Credits granted per unit of currency paid.
    pub tokens_per_unit: Credits,
    /// Upper bound on entries claimed per scheduler or campaign tick.
    pub scheduler_batch: i64,
    pub session_ttl_minutes: i64,
    pub callback_url: Option<String>,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            provider_defaults: settings.providers.clone(),
            tokens_per_unit: settings.tokens_per_unit,
            scheduler_batch: settings.scheduler_batch,
            session_ttl_minutes: settings.session_ttl_minutes,
            callback_url: settings.mpesa_callback_url.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_defaults: ProviderDefaults {
                country_code: "254".to_string(),
                ..ProviderDefaults::default()
            },
            tokens_per_unit: Credits::whole(1),
            scheduler_batch: 100,
            session_ttl_minutes: 1440,
            callback_url: None,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    admission: Admission,
    providers: Providers,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        providers: Providers,
        gateway: Arc<dyn PaymentGateway>,
        config: EngineConfig,
    ) -> Self {
        let ledger = Ledger::new(store.clone());
        Self {
            admission: Admission::new(ledger.clone()),
            ledger,
            store,
            providers,
            gateway,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
