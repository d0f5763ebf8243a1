//! Postgres-backed [`Store`]. Each method delegates to the per-table query
//! module and maps missing rows to [`StoreError::NotFound`] where the caller
//! expects a row to exist.

use super::{Settlement, Store, StoreError, StoreResult};
use crate::models::{
    ApiKey, Campaign, ChannelUsage, Contact, DeliveryLog, LogFilter, PaymentMethod,
    PaymentSession, Tenant, Transaction,
};
use crate::queries;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::types::{
    CampaignAnalytics, CampaignStatus, LogStatus, RecipientOutcome, SessionStatus,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and applies pending migrations before returning.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn found<T>(row: Option<T>, what: &str, id: &str) -> StoreResult<T> {
    row.ok_or_else(|| StoreError::NotFound(format!("{what} {id}")))
}

#[async_trait]
impl Store for PgStore {
    async fn get_tenant(&self, id: &str) -> StoreResult<Tenant> {
        found(queries::tenants::get_by_id(&self.pool, id).await?, "tenant", id)
    }

    async fn debit_if_affordable(
        &self,
        tenant_id: &str,
        cost: Credits,
    ) -> StoreResult<Option<Credits>> {
        Ok(queries::tenants::debit_if_affordable(&self.pool, tenant_id, cost).await?)
    }

    async fn credit(&self, tenant_id: &str, delta: Credits) -> StoreResult<Credits> {
        found(
            queries::tenants::credit(&self.pool, tenant_id, delta).await?,
            "tenant",
            tenant_id,
        )
    }

    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        Ok(queries::api_keys::get_by_hash(&self.pool, key_hash).await?)
    }

    async fn touch_api_key(&self, id: &str) -> StoreResult<()> {
        Ok(queries::api_keys::touch_last_used(&self.pool, id).await?)
    }

    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>> {
        Ok(queries::contacts::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn list_contacts_by_ids(
        &self,
        tenant_id: &str,
        ids: &[String],
    ) -> StoreResult<Vec<Contact>> {
        Ok(queries::contacts::list_by_ids(&self.pool, tenant_id, ids).await?)
    }

    async fn list_contacts_by_group(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> StoreResult<Vec<Contact>> {
        Ok(queries::contacts::list_by_group(&self.pool, tenant_id, group_id).await?)
    }

    async fn insert_log(&self, log: DeliveryLog) -> StoreResult<DeliveryLog> {
        Ok(queries::delivery_logs::insert(&self.pool, &log).await?)
    }

    async fn get_log(&self, tenant_id: &str, id: &str) -> StoreResult<DeliveryLog> {
        found(
            queries::delivery_logs::get_by_id(&self.pool, tenant_id, id).await?,
            "delivery log",
            id,
        )
    }

    async fn claim_due_log(&self, now: DateTime<Utc>) -> StoreResult<Option<DeliveryLog>> {
        Ok(queries::delivery_logs::claim_due(&self.pool, now).await?)
    }

    async fn claim_log(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DeliveryLog>> {
        Ok(queries::delivery_logs::claim_by_id(&self.pool, tenant_id, id, now).await?)
    }

    async fn finish_log(
        &self,
        id: &str,
        status: LogStatus,
        recipients: &[RecipientOutcome],
        cost: Credits,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(queries::delivery_logs::finish(&self.pool, id, status, recipients, cost, now).await?)
    }

    async fn list_logs(&self, tenant_id: &str, filter: &LogFilter) -> StoreResult<Vec<DeliveryLog>> {
        Ok(queries::delivery_logs::list_by_tenant(&self.pool, tenant_id, filter).await?)
    }

    async fn list_campaign_logs(&self, campaign_id: &str) -> StoreResult<Vec<DeliveryLog>> {
        Ok(queries::delivery_logs::list_by_campaign(&self.pool, campaign_id).await?)
    }

    async fn usage_by_channel(&self, tenant_id: &str) -> StoreResult<Vec<ChannelUsage>> {
        Ok(queries::delivery_logs::usage_by_channel(&self.pool, tenant_id).await?)
    }

    async fn insert_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        Ok(queries::campaigns::insert(&self.pool, &campaign).await?)
    }

    async fn get_campaign(&self, tenant_id: &str, id: &str) -> StoreResult<Campaign> {
        found(
            queries::campaigns::get_by_id(&self.pool, tenant_id, id).await?,
            "campaign",
            id,
        )
    }

    async fn list_campaigns(&self, tenant_id: &str) -> StoreResult<Vec<Campaign>> {
        Ok(queries::campaigns::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn transition_campaign(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Campaign>> {
        Ok(queries::campaigns::transition(&self.pool, id, from, to, now).await?)
    }

    async fn cancel_campaign(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Campaign>> {
        Ok(queries::campaigns::cancel(&self.pool, tenant_id, id, now).await?)
    }

    async fn claim_due_campaign(&self, now: DateTime<Utc>) -> StoreResult<Option<Campaign>> {
        Ok(queries::campaigns::claim_due(&self.pool, now).await?)
    }

    async fn update_campaign_analytics(
        &self,
        id: &str,
        analytics: CampaignAnalytics,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(queries::campaigns::update_analytics(&self.pool, id, analytics, now).await?)
    }

    async fn get_payment_method(&self, id: &str) -> StoreResult<Option<PaymentMethod>> {
        Ok(queries::payment_methods::get_by_id(&self.pool, id).await?)
    }

    async fn default_payment_method(&self) -> StoreResult<Option<PaymentMethod>> {
        Ok(queries::payment_methods::get_default(&self.pool).await?)
    }

    async fn record_payment_method_usage(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        Ok(queries::payment_methods::record_usage(&self.pool, id, now).await?)
    }

    async fn insert_transaction(&self, txn: Transaction) -> StoreResult<Transaction> {
        Ok(queries::transactions::insert(&self.pool, &txn).await?)
    }

    async fn get_transaction(&self, tenant_id: &str, id: &str) -> StoreResult<Transaction> {
        found(
            queries::transactions::get_by_id(&self.pool, tenant_id, id).await?,
            "transaction",
            id,
        )
    }

    async fn list_transactions(&self, tenant_id: &str, limit: i64) -> StoreResult<Vec<Transaction>> {
        Ok(queries::transactions::list_by_tenant(&self.pool, tenant_id, limit).await?)
    }

    async fn find_transaction_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> StoreResult<Option<Transaction>> {
        Ok(queries::transactions::get_by_checkout(&self.pool, checkout_request_id).await?)
    }

    async fn attach_gateway(
        &self,
        id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        Ok(queries::transactions::attach_gateway(
            &self.pool,
            id,
            checkout_request_id,
            merchant_request_id,
            metadata,
            now,
        )
        .await?)
    }

    async fn settle_transaction(
        &self,
        id: &str,
        settlement_reference: Option<&str>,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Settlement>> {
        let settled =
            queries::transactions::settle(&self.pool, id, settlement_reference, metadata, now)
                .await?;
        Ok(settled.map(|(transaction, balance)| Settlement {
            transaction,
            balance,
        }))
    }

    async fn fail_transaction(
        &self,
        id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        Ok(queries::transactions::fail(&self.pool, id, metadata, now).await?)
    }

    async fn insert_session(&self, session: PaymentSession) -> StoreResult<PaymentSession> {
        Ok(queries::payment_sessions::insert(&self.pool, &session).await?)
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<PaymentSession>> {
        Ok(queries::payment_sessions::get_by_token(&self.pool, token).await?)
    }

    async fn claim_session(
        &self,
        token: &str,
        phone: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        Ok(queries::payment_sessions::claim(&self.pool, token, phone, now).await?)
    }

    async fn link_session_transaction(
        &self,
        token: &str,
        transaction_id: &str,
        checkout_request_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(queries::payment_sessions::link_transaction(
            &self.pool,
            token,
            transaction_id,
            checkout_request_id,
            now,
        )
        .await?)
    }

    async fn finish_session(
        &self,
        token: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(queries::payment_sessions::finish_in(&self.pool, token, status, now).await?)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
