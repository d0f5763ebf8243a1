//! In-memory [`Store`] for tests and local development.
//!
//! All state sits behind one `tokio::sync::Mutex`, so every conditional
//! update is atomic with respect to every other call. Nothing is durable.

use super::{Settlement, Store, StoreError, StoreResult};
use crate::models::{
    ApiKey, ApiKeyStatus, Campaign, ChannelUsage, Contact, DeliveryLog, LogFilter,
    PaymentMethod, PaymentSession, Tenant, Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::types::{
    CampaignAnalytics, CampaignStatus, Channel, LogStatus, RecipientOutcome, SessionStatus,
    TransactionStatus,
};
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, Tenant>,
    api_keys: HashMap<String, ApiKey>,
    contacts: Vec<Contact>,
    logs: Vec<DeliveryLog>,
    campaigns: Vec<Campaign>,
    payment_methods: Vec<PaymentMethod>,
    transactions: Vec<Transaction>,
    sessions: HashMap<String, PaymentSession>,
    tenant_read_faults: u32,
    log_insert_faults: u32,
}

impl Inner {
    fn tenant_mut(&mut self, id: &str) -> StoreResult<&mut Tenant> {
        self.tenants
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {id}")))
    }

    fn take_fault(counter: &mut u32, what: &str) -> StoreResult<()> {
        if *counter == 0 {
            return Ok(());
        }
        *counter -= 1;
        Err(StoreError::Unexpected(anyhow::anyhow!("simulated {what} outage")))
    }

    fn finish_session(&mut self, token: &str, status: SessionStatus, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(token) {
            Some(session) if session.status.is_open() => {
                session.status = status;
                session.updated_at = now;
                true
            }
            _ => false,
        }
    }
}

/// Shallow JSON object merge, matching Postgres `jsonb || jsonb`.
fn merge_metadata(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_tenant(&self, tenant: Tenant) {
        self.inner
            .lock()
            .await
            .tenants
            .insert(tenant.id.clone(), tenant);
    }

    pub async fn seed_api_key(&self, key: ApiKey) {
        self.inner
            .lock()
            .await
            .api_keys
            .insert(key.key_hash.clone(), key);
    }

    pub async fn seed_contact(&self, contact: Contact) {
        self.inner.lock().await.contacts.push(contact);
    }

    pub async fn seed_payment_method(&self, method: PaymentMethod) {
        self.inner.lock().await.payment_methods.push(method);
    }

    /// Makes the next `n` tenant reads fail.
    pub async fn fail_tenant_reads(&self, n: u32) {
        self.inner.lock().await.tenant_read_faults = n;
    }

    /// Makes the next `n` delivery log inserts fail.
    pub async fn fail_log_inserts(&self, n: u32) {
        self.inner.lock().await.log_insert_faults = n;
    }

    /// Overwrites a tenant's suspension status or rates between test steps.
    pub async fn update_tenant(&self, id: &str, update: impl FnOnce(&mut Tenant)) {
        if let Some(tenant) = self.inner.lock().await.tenants.get_mut(id) {
            update(tenant);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_tenant(&self, id: &str) -> StoreResult<Tenant> {
        let mut inner = self.inner.lock().await;
        Inner::take_fault(&mut inner.tenant_read_faults, "tenant read")?;
        inner
            .tenants
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tenant {id}")))
    }

    async fn debit_if_affordable(
        &self,
        tenant_id: &str,
        cost: Credits,
    ) -> StoreResult<Option<Credits>> {
        let mut inner = self.inner.lock().await;
        let Some(tenant) = inner.tenants.get_mut(tenant_id) else {
            return Ok(None);
        };
        if tenant.balance < cost {
            return Ok(None);
        }
        tenant.balance = tenant.balance - cost;
        tenant.updated_at = Utc::now();
        Ok(Some(tenant.balance))
    }

    async fn credit(&self, tenant_id: &str, delta: Credits) -> StoreResult<Credits> {
        let mut inner = self.inner.lock().await;
        let tenant = inner.tenant_mut(tenant_id)?;
        tenant.balance = tenant.balance + delta;
        tenant.updated_at = Utc::now();
        Ok(tenant.balance)
    }

    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .api_keys
            .get(key_hash)
            .filter(|k| k.status == ApiKeyStatus::Active)
            .cloned())
    }

    async fn touch_api_key(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(key) = inner.api_keys.values_mut().find(|k| k.id == id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .contacts
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_contacts_by_ids(
        &self,
        tenant_id: &str,
        ids: &[String],
    ) -> StoreResult<Vec<Contact>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .contacts
            .iter()
            .filter(|c| c.tenant_id == tenant_id && ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn list_contacts_by_group(
        &self,
        tenant_id: &str,
        group_id: &str,
    ) -> StoreResult<Vec<Contact>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .contacts
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.group_ids.iter().any(|g| g == group_id))
            .cloned()
            .collect())
    }

    async fn insert_log(&self, log: DeliveryLog) -> StoreResult<DeliveryLog> {
        let mut inner = self.inner.lock().await;
        Inner::take_fault(&mut inner.log_insert_faults, "delivery log write")?;
        if inner.logs.iter().any(|l| l.id == log.id) {
            return Err(StoreError::Conflict(format!("delivery log {}", log.id)));
        }
        inner.logs.push(log.clone());
        Ok(log)
    }

    async fn get_log(&self, tenant_id: &str, id: &str) -> StoreResult<DeliveryLog> {
        let inner = self.inner.lock().await;
        inner
            .logs
            .iter()
            .find(|l| l.tenant_id == tenant_id && l.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("delivery log {id}")))
    }

    async fn claim_due_log(&self, now: DateTime<Utc>) -> StoreResult<Option<DeliveryLog>> {
        let mut inner = self.inner.lock().await;
        let due = inner
            .logs
            .iter_mut()
            .filter(|l| {
                l.status == LogStatus::Scheduled && l.scheduled_at.is_some_and(|at| at <= now)
            })
            .min_by_key(|l| l.scheduled_at);
        Ok(due.map(|log| {
            log.status = LogStatus::Processing;
            log.updated_at = now;
            log.clone()
        }))
    }

    async fn claim_log(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DeliveryLog>> {
        let mut inner = self.inner.lock().await;
        let log = inner.logs.iter_mut().find(|l| {
            l.tenant_id == tenant_id && l.id == id && l.status == LogStatus::Scheduled
        });
        Ok(log.map(|log| {
            log.status = LogStatus::Processing;
            log.updated_at = now;
            log.clone()
        }))
    }

    async fn finish_log(
        &self,
        id: &str,
        status: LogStatus,
        recipients: &[RecipientOutcome],
        cost: Credits,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner
            .logs
            .iter_mut()
            .find(|l| l.id == id && l.status == LogStatus::Processing)
        {
            Some(log) => {
                log.status = status;
                log.recipients = Json(recipients.to_vec());
                log.cost = cost;
                log.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_logs(&self, tenant_id: &str, filter: &LogFilter) -> StoreResult<Vec<DeliveryLog>> {
        let inner = self.inner.lock().await;
        let mut logs: Vec<DeliveryLog> = inner
            .logs
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .filter(|l| filter.channel.map_or(true, |c| l.channel == c))
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(filter.limit.max(0) as usize);
        Ok(logs)
    }

    async fn list_campaign_logs(&self, campaign_id: &str) -> StoreResult<Vec<DeliveryLog>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .iter()
            .filter(|l| l.campaign_id.as_deref() == Some(campaign_id))
            .cloned()
            .collect())
    }

    async fn usage_by_channel(&self, tenant_id: &str) -> StoreResult<Vec<ChannelUsage>> {
        let inner = self.inner.lock().await;
        let mut usage = Vec::new();
        for channel in Channel::ALL {
            let logs: Vec<&DeliveryLog> = inner
                .logs
                .iter()
                .filter(|l| l.tenant_id == tenant_id && l.channel == channel)
                .collect();
            if logs.is_empty() {
                continue;
            }
            usage.push(ChannelUsage {
                channel,
                messages: logs.len() as i64,
                failed: logs.iter().filter(|l| l.status == LogStatus::Failed).count() as i64,
                credits_used: logs.iter().fold(Credits::ZERO, |acc, l| acc + l.cost),
            });
        }
        Ok(usage)
    }

    async fn insert_campaign(&self, campaign: Campaign) -> StoreResult<Campaign> {
        let mut inner = self.inner.lock().await;
        if inner.campaigns.iter().any(|c| c.id == campaign.id) {
            return Err(StoreError::Conflict(format!("campaign {}", campaign.id)));
        }
        inner.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn get_campaign(&self, tenant_id: &str, id: &str) -> StoreResult<Campaign> {
        let inner = self.inner.lock().await;
        inner
            .campaigns
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))
    }

    async fn list_campaigns(&self, tenant_id: &str) -> StoreResult<Vec<Campaign>> {
        let inner = self.inner.lock().await;
        let mut campaigns: Vec<Campaign> = inner
            .campaigns
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn transition_campaign(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Campaign>> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .iter_mut()
            .find(|c| c.id == id && c.status == from);
        Ok(campaign.map(|c| {
            c.status = to;
            match to {
                CampaignStatus::Active => c.launched_at = Some(now),
                CampaignStatus::Completed => c.completed_at = Some(now),
                _ => {}
            }
            c.updated_at = now;
            c.clone()
        }))
    }

    async fn cancel_campaign(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Campaign>> {
        let mut inner = self.inner.lock().await;
        let campaign = inner
            .campaigns
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == id && !c.status.is_terminal());
        Ok(campaign.map(|c| {
            c.status = CampaignStatus::Canceled;
            c.updated_at = now;
            c.clone()
        }))
    }

    async fn claim_due_campaign(&self, now: DateTime<Utc>) -> StoreResult<Option<Campaign>> {
        let mut inner = self.inner.lock().await;
        let due = inner
            .campaigns
            .iter_mut()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled
                    && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .min_by_key(|c| c.scheduled_at);
        Ok(due.map(|c| {
            c.status = CampaignStatus::Active;
            c.launched_at = Some(now);
            c.updated_at = now;
            c.clone()
        }))
    }

    async fn update_campaign_analytics(
        &self,
        id: &str,
        analytics: CampaignAnalytics,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(c) = inner.campaigns.iter_mut().find(|c| c.id == id) {
            c.analytics = Json(analytics);
            c.updated_at = now;
        }
        Ok(())
    }

    async fn get_payment_method(&self, id: &str) -> StoreResult<Option<PaymentMethod>> {
        let inner = self.inner.lock().await;
        Ok(inner.payment_methods.iter().find(|m| m.id == id).cloned())
    }

    async fn default_payment_method(&self) -> StoreResult<Option<PaymentMethod>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payment_methods
            .iter()
            .find(|m| m.is_default && m.is_active)
            .cloned())
    }

    async fn record_payment_method_usage(&self, id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(m) = inner.payment_methods.iter_mut().find(|m| m.id == id) {
            m.transaction_count += 1;
            m.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn insert_transaction(&self, txn: Transaction) -> StoreResult<Transaction> {
        let mut inner = self.inner.lock().await;
        if inner.transactions.iter().any(|t| t.id == txn.id) {
            return Err(StoreError::Conflict(format!("transaction {}", txn.id)));
        }
        inner.transactions.push(txn.clone());
        Ok(txn)
    }

    async fn get_transaction(&self, tenant_id: &str, id: &str) -> StoreResult<Transaction> {
        let inner = self.inner.lock().await;
        inner
            .transactions
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))
    }

    async fn list_transactions(&self, tenant_id: &str, limit: i64) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        let mut txns: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txns.truncate(limit.max(0) as usize);
        Ok(txns)
    }

    async fn find_transaction_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .iter()
            .find(|t| t.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn attach_gateway(
        &self,
        id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let mut inner = self.inner.lock().await;
        if inner.transactions.iter().any(|t| {
            t.id != id && t.checkout_request_id.as_deref() == Some(checkout_request_id)
        }) {
            return Err(StoreError::Conflict(format!(
                "checkout request {checkout_request_id}"
            )));
        }
        let txn = inner
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.status == TransactionStatus::Pending);
        Ok(txn.map(|t| {
            t.checkout_request_id = Some(checkout_request_id.to_string());
            t.merchant_request_id = Some(merchant_request_id.to_string());
            merge_metadata(&mut t.metadata, metadata);
            t.updated_at = now;
            t.clone()
        }))
    }

    async fn settle_transaction(
        &self,
        id: &str,
        settlement_reference: Option<&str>,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Settlement>> {
        let mut inner = self.inner.lock().await;
        let Some(tenant_id) = inner
            .transactions
            .iter()
            .find(|t| t.id == id && t.status == TransactionStatus::Pending)
            .map(|t| t.tenant_id.clone())
        else {
            return Ok(None);
        };
        inner.tenant_mut(&tenant_id)?;

        let Some(txn) = inner.transactions.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        txn.status = TransactionStatus::Completed;
        txn.settlement_reference = settlement_reference.map(str::to_string);
        merge_metadata(&mut txn.metadata, metadata);
        txn.updated_at = now;
        let settled = txn.clone();

        let tenant = inner.tenant_mut(&settled.tenant_id)?;
        tenant.balance = tenant.balance + settled.tokens;
        let balance = tenant.balance;

        if let Some(token) = settled.session_token.as_deref() {
            inner.finish_session(token, SessionStatus::Completed, now);
        }

        Ok(Some(Settlement {
            transaction: settled,
            balance,
        }))
    }

    async fn fail_transaction(
        &self,
        id: &str,
        metadata: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let mut inner = self.inner.lock().await;
        let Some(txn) = inner
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.status == TransactionStatus::Pending)
        else {
            return Ok(None);
        };
        txn.status = TransactionStatus::Failed;
        merge_metadata(&mut txn.metadata, metadata);
        txn.updated_at = now;
        let failed = txn.clone();

        if let Some(token) = failed.session_token.as_deref() {
            inner.finish_session(token, SessionStatus::Failed, now);
        }
        Ok(Some(failed))
    }

    async fn insert_session(&self, session: PaymentSession) -> StoreResult<PaymentSession> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&session.token) {
            return Err(StoreError::Conflict("payment session token".to_string()));
        }
        inner
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<PaymentSession>> {
        Ok(self.inner.lock().await.sessions.get(token).cloned())
    }

    async fn claim_session(
        &self,
        token: &str,
        phone: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentSession>> {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(token) {
            Some(s) if s.status == SessionStatus::Pending && s.expires_at > now => {
                s.status = SessionStatus::Processing;
                s.phone = Some(phone.to_string());
                s.updated_at = now;
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn link_session_transaction(
        &self,
        token: &str,
        transaction_id: &str,
        checkout_request_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.sessions.get_mut(token) {
            s.transaction_id = Some(transaction_id.to_string());
            if let Some(checkout) = checkout_request_id {
                s.checkout_request_id = Some(checkout.to_string());
            }
            s.updated_at = now;
        }
        Ok(())
    }

    async fn finish_session(
        &self,
        token: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self.inner.lock().await.finish_session(token, status, now))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
