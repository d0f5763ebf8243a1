//! Dispatch router: validates a send, reserves its cost, fans it out to the
//! channel provider and records one delivery log entry per recipient.
//!
//! Scheduled sends are paid for up-front and recorded as a single entry; the
//! scheduler later replays that entry through [`Engine::execute_scheduled`]
//! without a second admission check.

use chrono::{DateTime, Utc};
use notifyhub_core::credits::{Affordability, Credits};
use notifyhub_core::phone;
use notifyhub_core::providers::ProviderConfig;
use notifyhub_core::types::{Attachment, Channel, LogStatus, RecipientOutcome, RecipientStatus};
use notifyhub_db::models::{ChannelUsage, DeliveryLog, LogFilter, Tenant};
use notifyhub_db::Json;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::providers::OutboundMessage;
use crate::Engine;

const PREVIEW_CHARS: usize = 100;

/// What to send on one channel, independent of who receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub channel: Channel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageContent {
    pub fn validate(&self) -> EngineResult<()> {
        let blank = |v: Option<&str>| v.map_or(true, |s| s.trim().is_empty());
        match self.channel {
            Channel::Sms if blank(Some(self.message.as_str())) => {
                Err(EngineError::validation("Message is required for SMS"))
            }
            Channel::Email if blank(self.subject.as_deref()) || blank(Some(self.message.as_str())) => Err(
                EngineError::validation("Subject and message are required for email"),
            ),
            Channel::Email => self.attachments.iter().try_for_each(|att| {
                if att.filename.trim().is_empty() || blank(att.content.as_deref()) {
                    Err(EngineError::validation(
                        "Attachments need a filename and base64 content",
                    ))
                } else {
                    Ok(())
                }
            }),
            _ => Ok(()),
        }
    }

    fn preview(&self) -> String {
        let source = match self.channel {
            Channel::Email => self.subject.as_deref().unwrap_or(&self.message),
            _ => &self.message,
        };
        source.chars().take(PREVIEW_CHARS).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(flatten)]
    pub content: MessageContent,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToAllRequest {
    #[serde(flatten)]
    pub content: MessageContent,
}

/// Result of an immediate fan-out.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub logs: Vec<DeliveryLog>,
    pub delivered: u64,
    pub failed: u64,
    pub charged: Credits,
    /// Ids of entries that were sent (and charged) but could not be written
    /// to the delivery log.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecorded: Vec<String>,
}

impl DispatchReport {
    fn count(&mut self, log: &DeliveryLog) {
        if log.status == LogStatus::Sent {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
        self.charged = self.charged + log.cost;
    }

    fn record(&mut self, log: DeliveryLog) {
        self.count(&log);
        self.logs.push(log);
    }

    fn record_unpersisted(&mut self, log: &DeliveryLog) {
        self.count(log);
        self.unrecorded.push(log.id.clone());
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub balance: Credits,
    pub credits_used: Credits,
    pub total_messages: i64,
    pub failed_messages: i64,
    pub channels: Vec<ChannelUsage>,
}

pub(crate) fn new_log_id() -> String {
    format!("log_{}", nanoid::nanoid!(21))
}

/// Scheduled entries keep attachment content so the replay can send it;
/// everything else records names and types only.
#[allow(clippy::too_many_arguments)]
fn log_entry(
    tenant: &Tenant,
    user_id: Option<&str>,
    content: &MessageContent,
    recipients: Vec<RecipientOutcome>,
    cost: Credits,
    status: LogStatus,
    campaign_id: Option<&str>,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DeliveryLog {
    let attachments = if status == LogStatus::Scheduled {
        content.attachments.clone()
    } else {
        content.attachments.iter().map(Attachment::without_content).collect()
    };
    DeliveryLog {
        id: new_log_id(),
        tenant_id: tenant.id.clone(),
        channel: content.channel,
        user_id: user_id.map(str::to_string),
        recipients: Json(recipients),
        preview: content.preview(),
        message: content.message.clone(),
        subject: content.subject.clone(),
        attachments: Json(attachments),
        cost,
        network: content.channel.network().to_string(),
        campaign_id: campaign_id.map(str::to_string),
        scheduled_at,
        status,
        created_at: now,
        updated_at: now,
    }
}

/// Share of `total` attributable to `part` of `whole` recipients.
fn proportional(total: Credits, part: u64, whole: u64) -> Credits {
    if whole == 0 {
        return Credits::ZERO;
    }
    let cents = total.cents() as i128 * part as i128 / whole as i128;
    Credits::from_cents(cents as i64)
}

impl Engine {
    pub(crate) async fn active_tenant(&self, tenant_id: &str) -> EngineResult<Tenant> {
        let tenant = self.store.get_tenant(tenant_id).await?;
        if !tenant.is_active() {
            return Err(EngineError::validation("Organization is not active"));
        }
        Ok(tenant)
    }

    pub(crate) fn provider_config(&self, tenant: &Tenant) -> ProviderConfig {
        ProviderConfig::resolve(
            &tenant.credentials.0,
            &self.config.provider_defaults,
            &tenant.name,
        )
    }

    pub async fn check_affordable(
        &self,
        tenant_id: &str,
        channel: Channel,
        count: u64,
    ) -> EngineResult<Affordability> {
        let tenant = self.store.get_tenant(tenant_id).await?;
        self.admission.check(&tenant, channel, count).await
    }

    /// Delivers to one address and reports the recipient-level outcome.
    /// Never fails: provider errors become a failed outcome.
    async fn deliver(
        &self,
        config: &ProviderConfig,
        content: &MessageContent,
        recipient: &str,
    ) -> RecipientOutcome {
        let to = if content.channel.uses_phone() {
            let normalized = phone::normalize(recipient, &config.country_code);
            if !phone::is_dialable(&normalized) {
                return RecipientOutcome::failed(recipient, "Invalid phone number");
            }
            normalized
        } else {
            recipient.trim().to_string()
        };

        let message = OutboundMessage {
            channel: content.channel,
            to: to.clone(),
            subject: content.subject.clone(),
            body: content.message.clone(),
            attachments: content.attachments.clone(),
        };

        match self
            .providers
            .for_channel(content.channel)
            .send(config, &message)
            .await
        {
            Ok(response) => RecipientOutcome::success(to, response.raw),
            Err(err) => {
                tracing::warn!(channel = %content.channel, recipient = %to, error = %err, "provider send failed");
                RecipientOutcome::failed(to, err.to_string())
            }
        }
    }

    /// Writes an entry for a send that already happened, retrying once.
    async fn persist_log(&self, entry: &DeliveryLog) -> EngineResult<DeliveryLog> {
        match self.store.insert_log(entry.clone()).await {
            Ok(log) => Ok(log),
            Err(err) => {
                tracing::warn!(log_id = %entry.id, error = %err, "retrying delivery log insert");
                Ok(self.store.insert_log(entry.clone()).await?)
            }
        }
    }

    /// Admits the whole batch in one reservation, then sends to each address.
    /// Failed recipients are refunded from the reservation.
    pub(crate) async fn fan_out(
        &self,
        tenant: &Tenant,
        user_id: Option<&str>,
        content: &MessageContent,
        recipients: &[String],
        campaign_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchReport> {
        let reservation = self
            .admission
            .admit(tenant, content.channel, recipients.len() as u64)
            .await?;
        let config = self.provider_config(tenant);
        let mut report = DispatchReport::default();
        let mut undelivered = 0u64;

        for recipient in recipients {
            let outcome = self.deliver(&config, content, recipient).await;
            let (status, cost) = if outcome.status == RecipientStatus::Success {
                (LogStatus::Sent, reservation.rate)
            } else {
                undelivered += 1;
                (LogStatus::Failed, Credits::ZERO)
            };
            let entry = log_entry(
                tenant, user_id, content, vec![outcome], cost, status, campaign_id, None, now,
            );
            match self.persist_log(&entry).await {
                Ok(log) => report.record(log),
                Err(err) => {
                    tracing::error!(
                        tenant_id = %tenant.id,
                        log_id = %entry.id,
                        recipient = %recipient,
                        status = ?entry.status,
                        cost = %entry.cost,
                        error = %err,
                        "delivery happened but could not be recorded"
                    );
                    report.record_unpersisted(&entry);
                }
            }
        }

        self.admission.release(&reservation, undelivered).await?;
        tracing::info!(
            tenant_id = %tenant.id,
            channel = %content.channel,
            delivered = report.delivered,
            failed = report.failed,
            charged = %report.charged,
            "dispatch finished"
        );
        Ok(report)
    }

    /// Pre-debits the full cost and records one `scheduled` entry covering
    /// every recipient.
    pub(crate) async fn schedule(
        &self,
        tenant: &Tenant,
        user_id: Option<&str>,
        content: &MessageContent,
        recipients: &[String],
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<DeliveryLog> {
        if at <= now {
            return Err(EngineError::validation("Scheduled time must be in the future"));
        }
        let reservation = self
            .admission
            .admit(tenant, content.channel, recipients.len() as u64)
            .await?;
        let pending = recipients.iter().map(RecipientOutcome::pending).collect();
        let entry = log_entry(
            tenant,
            user_id,
            content,
            pending,
            reservation.total,
            LogStatus::Scheduled,
            None,
            Some(at),
            now,
        );

        match self.store.insert_log(entry).await {
            Ok(log) => {
                tracing::info!(tenant_id = %tenant.id, log_id = %log.id, scheduled_at = %at, cost = %log.cost, "send scheduled");
                Ok(log)
            }
            Err(err) => {
                self.admission.release(&reservation, reservation.count).await?;
                Err(err.into())
            }
        }
    }

    /// Sends to one or more explicit recipients now, or schedules the send.
    ///
    /// A single immediate recipient whose delivery fails is surfaced as a
    /// provider error after the failure has been recorded.
    pub async fn send_notification(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        req: SendRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchReport> {
        req.content.validate()?;
        let recipients: Vec<String> = req
            .recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(EngineError::validation("At least one recipient is required"));
        }
        let tenant = self.active_tenant(tenant_id).await?;

        if let Some(at) = req.scheduled_at {
            let log = self
                .schedule(&tenant, user_id, &req.content, &recipients, at, now)
                .await?;
            return Ok(DispatchReport {
                charged: log.cost,
                logs: vec![log],
                ..DispatchReport::default()
            });
        }

        let report = self
            .fan_out(&tenant, user_id, &req.content, &recipients, None, now)
            .await?;
        if recipients.len() == 1 && report.delivered == 0 {
            let reason = report
                .logs
                .first()
                .and_then(|log| log.recipients.0.first())
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| "delivery failed".to_string());
            return Err(EngineError::Provider(reason));
        }
        Ok(report)
    }

    /// Sends to every contact of the tenant. Contacts without an address for
    /// the channel are recorded as failed and not charged.
    pub async fn send_to_all(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        req: SendToAllRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<DispatchReport> {
        req.content.validate()?;
        let tenant = self.active_tenant(tenant_id).await?;
        let contacts = self.store.list_contacts(tenant_id).await?;
        if contacts.is_empty() {
            return Err(EngineError::validation("No contacts found"));
        }

        let channel = req.content.channel;
        let (reachable, unreachable): (Vec<_>, Vec<_>) = contacts
            .iter()
            .partition(|c| c.address(channel).is_some());
        let addresses: Vec<String> = reachable
            .iter()
            .filter_map(|c| c.address(channel).map(str::to_string))
            .collect();

        let mut report = if addresses.is_empty() {
            DispatchReport::default()
        } else {
            self.fan_out(&tenant, user_id, &req.content, &addresses, None, now)
                .await?
        };

        for contact in unreachable {
            let outcome = RecipientOutcome::failed(contact.name.clone(), "No contact info");
            let entry = log_entry(
                &tenant,
                user_id,
                &req.content,
                vec![outcome],
                Credits::ZERO,
                LogStatus::Failed,
                None,
                None,
                now,
            );
            report.record(self.store.insert_log(entry).await?);
        }
        Ok(report)
    }

    /// Claims one of the tenant's scheduled entries and executes it right away.
    pub async fn send_now(
        &self,
        tenant_id: &str,
        log_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<DeliveryLog> {
        let Some(claimed) = self.store.claim_log(tenant_id, log_id, now).await? else {
            let existing = self.store.get_log(tenant_id, log_id).await?;
            return Err(EngineError::Conflict(format!(
                "delivery log {} is {:?}, not scheduled",
                existing.id, existing.status
            )));
        };
        self.execute_scheduled(claimed, now).await?;
        Ok(self.store.get_log(tenant_id, log_id).await?)
    }

    /// Replays a claimed, pre-paid entry. No admission check runs; undelivered
    /// recipients are refunded pro rata, and a fully failed entry (including
    /// one whose tenant cannot be loaded) is refunded in full even when
    /// recording the failure itself errors.
    ///
    /// Returns `None` when the entry is no longer `processing`.
    pub async fn execute_scheduled(
        &self,
        log: DeliveryLog,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<LogStatus>> {
        if log.status != LogStatus::Processing {
            tracing::debug!(log_id = %log.id, status = ?log.status, "skipping entry not in processing");
            return Ok(None);
        }

        let content = MessageContent {
            channel: log.channel,
            message: log.message.clone(),
            subject: log.subject.clone(),
            attachments: log.attachments.0.clone(),
        };
        let fail_all = |reason: &str| -> Vec<RecipientOutcome> {
            log.recipients
                .0
                .iter()
                .map(|r| RecipientOutcome::failed(&r.recipient, reason))
                .collect()
        };

        // Once claimed, every path below finishes the entry and refunds.
        let outcomes = match self.store.get_tenant(&log.tenant_id).await {
            Ok(tenant) if tenant.is_active() => {
                let config = self.provider_config(&tenant);
                let mut outcomes = Vec::with_capacity(log.recipients.0.len());
                for recipient in &log.recipients.0 {
                    outcomes.push(self.deliver(&config, &content, &recipient.recipient).await);
                }
                outcomes
            }
            Ok(_) => fail_all("Organization is not active"),
            Err(err) => {
                tracing::error!(log_id = %log.id, tenant_id = %log.tenant_id, error = %err, "tenant lookup failed for scheduled entry");
                fail_all("Organization could not be loaded")
            }
        };

        let total = outcomes.len() as u64;
        let failed = outcomes
            .iter()
            .filter(|o| o.status != RecipientStatus::Success)
            .count() as u64;
        let (status, refund) = if failed == total {
            (LogStatus::Failed, log.cost)
        } else {
            (LogStatus::Sent, proportional(log.cost, failed, total))
        };

        let finished = self
            .store
            .finish_log(&log.id, status, &outcomes, log.cost - refund, now)
            .await;
        self.ledger.refund(&log.tenant_id, refund).await?;

        match finished? {
            true => {
                tracing::info!(log_id = %log.id, tenant_id = %log.tenant_id, status = ?status, refunded = %refund, "scheduled entry executed");
                Ok(Some(status))
            }
            false => {
                tracing::warn!(log_id = %log.id, "scheduled entry left processing before it finished");
                Ok(None)
            }
        }
    }

    pub async fn list_logs(
        &self,
        tenant_id: &str,
        filter: &LogFilter,
    ) -> EngineResult<Vec<DeliveryLog>> {
        Ok(self.store.list_logs(tenant_id, filter).await?)
    }

    pub async fn usage(&self, tenant_id: &str) -> EngineResult<UsageSummary> {
        let balance = self.ledger.balance(tenant_id).await?;
        let channels = self.store.usage_by_channel(tenant_id).await?;
        let credits_used = channels
            .iter()
            .fold(Credits::ZERO, |acc, c| acc + c.credits_used);
        Ok(UsageSummary {
            balance,
            credits_used,
            total_messages: channels.iter().map(|c| c.messages).sum(),
            failed_messages: channels.iter().map(|c| c.failed).sum(),
            channels,
        })
    }
}
