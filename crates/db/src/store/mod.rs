//! Storage seam between the engine and its backends.
//!
//! Every method that changes a status or a balance is a single conditional
//! operation in both backends. Callers learn whether they won through the
//! returned `Option`/`bool`, never by reading first and writing second.

use crate::models::{
    ApiKey, Campaign, ChannelUsage, Contact, DeliveryLog, LogFilter, PaymentMethod,
    PaymentSession, Tenant, Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::types::{
    CampaignAnalytics, CampaignStatus, LogStatus, RecipientOutcome, SessionStatus,
};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a successful `pending -> completed` settlement.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction: Transaction,
    pub balance: Credits,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_tenant(&self, id: &str) -> StoreResult<Tenant>;
    /// `balance -= cost` iff `balance >= cost`; `None` when it does not cover.
    async fn debit_if_affordable(&self, tenant_id: &str, cost: Credits)
        -> StoreResult<Option<Credits>>;
    async fn credit(&self, tenant_id: &str, delta: Credits) -> StoreResult<Credits>;

    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;
    async fn touch_api_key(&self, id: &str) -> StoreResult<()>;

    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>>;
    async fn list_contacts_by_ids(&self, tenant_id: &str, ids: &[String])
        -> StoreResult<Vec<Contact>>;
    async fn list_contacts_by_group(&self, tenant_id: &str, group_id: &str)
        -> StoreResult<Vec<Contact>>;

    async fn insert_log(&self, log: DeliveryLog) -> StoreResult<DeliveryLog>;
    async fn get_log(&self, tenant_id: &str, id: &str) -> StoreResult<DeliveryLog>;
    /// Oldest entry with `status = scheduled` and `scheduled_at <= now`,
    /// moved to `processing`.
    async fn claim_due_log(&self, now: DateTime<Utc>) -> StoreResult<Option<DeliveryLog>>;
    async fn claim_log(&self, tenant_id: &str, id: &str, now: DateTime<Utc>)
        -> StoreResult<Option<DeliveryLog>>;
    async fn finish_log(
        &self,
        id: &str,
        status: LogStatus,
        recipients: &[RecipientOutcome],
        cost: Credits,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
    async fn list_logs(&self, tenant_id: &str, filter: &LogFilter) -> StoreResult<Vec<DeliveryLog>>;
    async fn list_campaign_logs(&self, campaign_id: &str) -> StoreResult<Vec<DeliveryLog>>;
    async fn usage_by_channel(&self, tenant_id: &str) -> StoreResult<Vec<ChannelUsage>>;

    async fn insert_campaign(&self, campaign: Campaign) -> StoreResult<Campaign>;
    async fn get_campaign(&self, tenant_id: &str, id: &str) -> StoreResult<Campaign>;
    async fn list_campaigns(&self, tenant_id: &str) -> StoreResult<Vec<Campaign>>;
    async fn transition_campaign(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Campaign>>;
    async fn cancel_campaign(&self, tenant_id: &str, id: &str, now: DateTime<Utc>)
        -> StoreResult<Option<Campaign>>;
    async fn claim_due_campaign(&self, now: DateTime<Utc>) -> StoreResult<Option<Campaign>>;
    async fn update_campaign_analytics(
        &self,
        id: &str,
        analytics: CampaignAnalytics,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn get_payment_method(&self, id: &str) -> StoreResult<Option<PaymentMethod>>;
    async fn default_payment_method(&self) -> StoreResult<Option<PaymentMethod>>;
    async fn record_payment_method_usage(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()>;

    async fn insert_transaction(&self, txn: Transaction) -> StoreResult<Transaction>;
    async fn get_transaction(&self, tenant_id: &str, id: &str) -> StoreResult<Transaction>;
    async fn list_transactions(&self, tenant_id: &str, limit: i64) -> StoreResult<Vec<Transaction>>;
    async fn find_transaction_by_checkout(&self, checkout_request_id: &str)
        -> StoreResult<Option<Transaction>>;
    async fn attach_gateway(
        &self,
        id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>>;
    /// `pending -> completed`, credits the tenant by `tokens` and completes a
    /// linked session, atomically. `None` if the transaction was not pending.
    async fn settle_transaction(
        &self,
        id: &str,
        settlement_reference: Option<&str>,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Settlement>>;
    /// `pending -> failed`, failing a linked session.
    async fn fail_transaction(
        &self,
        id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>>;

    async fn insert_session(&self, session: PaymentSession) -> StoreResult<PaymentSession>;
    async fn get_session(&self, token: &str) -> StoreResult<Option<PaymentSession>>;
    async fn claim_session(&self, token: &str, phone: &str, now: DateTime<Utc>)
        -> StoreResult<Option<PaymentSession>>;
    async fn link_session_transaction(
        &self,
        token: &str,
        transaction_id: &str,
        checkout_request_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn finish_session(&self, token: &str, status: SessionStatus, now: DateTime<Utc>)
        -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
