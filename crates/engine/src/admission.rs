//! Admission control: approve a send of `count` messages on one channel
//! and reserve its cost in the same atomic step.

use notifyhub_core::credits::{check_affordable, Affordability, Credits};
use notifyhub_core::types::Channel;
use notifyhub_db::models::Tenant;

use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;

/// Credits held for an admitted send. Unused shares are handed back with
/// [`Admission::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub tenant_id: String,
    pub channel: Channel,
    pub count: u64,
    pub rate: Credits,
    pub total: Credits,
}

impl Reservation {
    pub fn share(&self, count: u64) -> Credits {
        self.rate.times(count)
    }
}

#[derive(Clone)]
pub struct Admission {
    ledger: Ledger,
}

impl Admission {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Read-only affordability check against the tenant's current balance.
    pub async fn check(
        &self,
        tenant: &Tenant,
        channel: Channel,
        count: u64,
    ) -> EngineResult<Affordability> {
        let balance = self.ledger.balance(&tenant.id).await?;
        Ok(check_affordable(balance, tenant.rates().rate(channel), count))
    }

    /// Reserves `rate × count` with a conditional decrement. On rejection the
    /// error carries how many messages the current balance would cover.
    pub async fn admit(
        &self,
        tenant: &Tenant,
        channel: Channel,
        count: u64,
    ) -> EngineResult<Reservation> {
        let rate = tenant.rates().rate(channel);
        let total = rate.times(count);
        let reservation = Reservation {
            tenant_id: tenant.id.clone(),
            channel,
            count,
            rate,
            total,
        };

        if total <= Credits::ZERO {
            return Ok(reservation);
        }

        match self.ledger.reserve(&tenant.id, total).await? {
            Some(balance) => {
                tracing::debug!(
                    tenant_id = %tenant.id,
                    channel = %channel,
                    count,
                    reserved = %total,
                    balance = %balance,
                    "send admitted"
                );
                Ok(reservation)
            }
            None => {
                let available = self.ledger.balance(&tenant.id).await?;
                let check = check_affordable(available, rate, count);
                tracing::info!(
                    tenant_id = %tenant.id,
                    channel = %channel,
                    count,
                    required = %total,
                    available = %available,
                    affordable = check.affordable_count,
                    "send rejected for insufficient credit"
                );
                Err(EngineError::InsufficientCredit {
                    required: total,
                    available,
                    affordable_count: check.affordable_count,
                })
            }
        }
    }

    /// Refunds the share of a reservation that was not delivered.
    pub async fn release(&self, reservation: &Reservation, undelivered: u64) -> EngineResult<()> {
        self.ledger
            .refund(&reservation.tenant_id, reservation.share(undelivered))
            .await
    }
}
