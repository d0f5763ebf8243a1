//! Credit ledger. Every mutation is a single atomic delta in the store.

use notifyhub_core::credits::Credits;
use notifyhub_db::Store;
use std::sync::Arc;

use crate::error::EngineResult;

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, tenant_id: &str) -> EngineResult<Credits> {
        Ok(self.store.get_tenant(tenant_id).await?.balance)
    }

    /// Unconditional delta. A negative delta may take the balance below zero;
    /// normal paths go through [`Ledger::reserve`] instead.
    pub async fn adjust(&self, tenant_id: &str, delta: Credits) -> EngineResult<Credits> {
        Ok(self.store.credit(tenant_id, delta).await?)
    }

    /// Debits `cost` only if the balance covers it. Returns the new balance.
    pub async fn reserve(&self, tenant_id: &str, cost: Credits) -> EngineResult<Option<Credits>> {
        Ok(self.store.debit_if_affordable(tenant_id, cost).await?)
    }

    /// Returns previously reserved credits. A zero amount touches nothing.
    pub async fn refund(&self, tenant_id: &str, amount: Credits) -> EngineResult<()> {
        if amount > Credits::ZERO {
            let balance = self.adjust(tenant_id, amount).await?;
            tracing::info!(tenant_id, refunded = %amount, balance = %balance, "credits refunded");
        }
        Ok(())
    }
}
