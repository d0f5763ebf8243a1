//! Campaign lifecycle and execution.
//!
//! Status only moves forward: draft -> scheduled -> active -> completed, or
//! to canceled from any non-terminal state. Every move is a conditional
//! update on the expected current status.

use chrono::{DateTime, Utc};
use notifyhub_core::types::{
    CampaignAnalytics, CampaignStatus, Channel, ChannelMessage, RecipientPolicy, RecipientStatus,
};
use notifyhub_db::models::{Campaign, Contact, DeliveryLog};
use notifyhub_db::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dispatch::MessageContent;
use crate::error::{EngineError, EngineResult};
use crate::Engine;

const UNLOADED_TENANT: &str = "Organization could not be loaded";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaign {
    pub name: String,
    pub channels: Vec<Channel>,
    pub messages: BTreeMap<Channel, ChannelMessage>,
    pub recipient_policy: RecipientPolicy,
    #[serde(default)]
    pub selected_contacts: Vec<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub save_as_draft: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Contacts without an address for this channel. Not charged.
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRun {
    pub campaign: Campaign,
    pub channels: Vec<ChannelOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Launch {
    Scheduled { campaign: Campaign },
    Completed(CampaignRun),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub promoted: u32,
    pub completed: u32,
    pub canceled: u32,
}

/// `sent` counts entries; an entry counts as delivered or failed when any of
/// its recipients did.
pub fn analytics_from_logs(logs: &[DeliveryLog]) -> CampaignAnalytics {
    let any = |log: &DeliveryLog, status: RecipientStatus| {
        log.recipients.0.iter().any(|r| r.status == status)
    };
    CampaignAnalytics {
        sent: logs.len() as u32,
        delivered: logs.iter().filter(|l| any(l, RecipientStatus::Success)).count() as u32,
        failed: logs.iter().filter(|l| any(l, RecipientStatus::Failed)).count() as u32,
    }
}

fn content_for(channel: Channel, message: &ChannelMessage) -> MessageContent {
    MessageContent {
        channel,
        message: message.content.clone(),
        subject: message.subject.clone(),
        attachments: message.attachments.clone(),
    }
}

impl CreateCampaign {
    fn validate(&self, now: DateTime<Utc>) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::validation("Campaign name is required"));
        }
        if self.channels.is_empty() {
            return Err(EngineError::validation("At least one channel is required"));
        }
        for channel in &self.channels {
            let message = self.messages.get(channel).ok_or_else(|| {
                EngineError::validation(format!("Message for {channel} is required"))
            })?;
            content_for(*channel, message).validate()?;
        }
        if !self.save_as_draft && self.scheduled_at.is_some_and(|at| at <= now) {
            return Err(EngineError::validation("Scheduled time must be in the future"));
        }
        Ok(())
    }
}

impl Engine {
    pub async fn create_campaign(
        &self,
        tenant_id: &str,
        user_id: &str,
        req: CreateCampaign,
        now: DateTime<Utc>,
    ) -> EngineResult<Campaign> {
        req.validate(now)?;
        self.active_tenant(tenant_id).await?;

        let status = match req.scheduled_at {
            Some(_) if !req.save_as_draft => CampaignStatus::Scheduled,
            _ => CampaignStatus::Draft,
        };
        let mut channels = req.channels;
        channels.sort();
        channels.dedup();

        let campaign = Campaign {
            id: format!("cmp_{}", nanoid::nanoid!(21)),
            tenant_id: tenant_id.to_string(),
            created_by: user_id.to_string(),
            name: req.name.trim().to_string(),
            channels: Json(channels),
            messages: Json(req.messages),
            recipient_policy: req.recipient_policy,
            selected_contacts: req.selected_contacts,
            group_id: req.group_id,
            scheduled_at: req.scheduled_at,
            status,
            analytics: Json(CampaignAnalytics::default()),
            launched_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let campaign = self.store.insert_campaign(campaign).await?;
        tracing::info!(tenant_id, campaign_id = %campaign.id, status = ?campaign.status, "campaign created");
        Ok(campaign)
    }

    pub async fn list_campaigns(&self, tenant_id: &str) -> EngineResult<Vec<Campaign>> {
        Ok(self.store.list_campaigns(tenant_id).await?)
    }

    pub async fn get_campaign(&self, tenant_id: &str, id: &str) -> EngineResult<Campaign> {
        Ok(self.store.get_campaign(tenant_id, id).await?)
    }

    /// Launches a draft. A future schedule parks it as `scheduled` for the
    /// promotion tick; otherwise it runs now.
    pub async fn launch_campaign(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Launch> {
        let campaign = self.store.get_campaign(tenant_id, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(EngineError::Conflict(format!(
                "campaign {id} is {:?}, only drafts can be launched",
                campaign.status
            )));
        }
        self.active_tenant(tenant_id).await?;

        if campaign.scheduled_at.is_some_and(|at| at > now) {
            let scheduled = self
                .store
                .transition_campaign(id, CampaignStatus::Draft, CampaignStatus::Scheduled, now)
                .await?
                .ok_or_else(|| EngineError::Conflict(format!("campaign {id} changed state")))?;
            return Ok(Launch::Scheduled {
                campaign: scheduled,
            });
        }

        let contacts = self.resolve_recipients(&campaign).await?;
        let active = self
            .store
            .transition_campaign(id, CampaignStatus::Draft, CampaignStatus::Active, now)
            .await?
            .ok_or_else(|| EngineError::Conflict(format!("campaign {id} changed state")))?;
        Ok(Launch::Completed(self.execute_campaign(active, &contacts, now).await?))
    }

    pub async fn cancel_campaign(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Campaign> {
        match self.store.cancel_campaign(tenant_id, id, now).await? {
            Some(campaign) => {
                tracing::info!(tenant_id, campaign_id = id, "campaign canceled");
                Ok(campaign)
            }
            None => {
                let existing = self.store.get_campaign(tenant_id, id).await?;
                Err(EngineError::Conflict(format!(
                    "campaign {id} is already {:?}",
                    existing.status
                )))
            }
        }
    }

    /// Recomputes analytics from the campaign's delivery log and stores them.
    pub async fn campaign_analytics(
        &self,
        tenant_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<CampaignAnalytics> {
        let campaign = self.store.get_campaign(tenant_id, id).await?;
        self.refresh_analytics(&campaign.id, now).await
    }

    async fn refresh_analytics(
        &self,
        campaign_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<CampaignAnalytics> {
        let logs = self.store.list_campaign_logs(campaign_id).await?;
        let analytics = analytics_from_logs(&logs);
        self.store
            .update_campaign_analytics(campaign_id, analytics, now)
            .await?;
        Ok(analytics)
    }

    pub async fn resolve_recipients(&self, campaign: &Campaign) -> EngineResult<Vec<Contact>> {
        let tenant_id = &campaign.tenant_id;
        let contacts = match campaign.recipient_policy {
            RecipientPolicy::All => self.store.list_contacts(tenant_id).await?,
            RecipientPolicy::Selected => {
                if campaign.selected_contacts.is_empty() {
                    return Err(EngineError::validation("No selected contacts"));
                }
                self.store
                    .list_contacts_by_ids(tenant_id, &campaign.selected_contacts)
                    .await?
            }
            RecipientPolicy::Group => {
                let group_id = campaign
                    .group_id
                    .as_deref()
                    .filter(|g| !g.trim().is_empty())
                    .ok_or_else(|| EngineError::validation("No group selected"))?;
                self.store.list_contacts_by_group(tenant_id, group_id).await?
            }
            RecipientPolicy::Segments => {
                return Err(EngineError::validation("Segment targeting is not supported"))
            }
        };
        if contacts.is_empty() {
            return Err(EngineError::validation("No valid recipients found"));
        }
        Ok(contacts)
    }

    /// Fans an `active` campaign out per channel, then records analytics and
    /// completes it. A channel rejected for insufficient credit is reported
    /// and the remaining channels still run.
    pub async fn execute_campaign(
        &self,
        campaign: Campaign,
        contacts: &[Contact],
        now: DateTime<Utc>,
    ) -> EngineResult<CampaignRun> {
        let tenant = match self.store.get_tenant(&campaign.tenant_id).await {
            Ok(tenant) => Some(tenant),
            Err(err) => {
                tracing::error!(campaign_id = %campaign.id, error = %err, "failed to load campaign organization");
                None
            }
        };
        let mut outcomes = Vec::with_capacity(campaign.channels.0.len());

        for channel in campaign.channels.0.iter().copied() {
            let Some(message) = campaign.messages.0.get(&channel) else {
                continue;
            };
            let content = content_for(channel, message);
            let addresses: Vec<String> = contacts
                .iter()
                .filter_map(|c| c.address(channel).map(str::to_string))
                .collect();
            let mut outcome = ChannelOutcome {
                channel,
                attempted: addresses.len() as u64,
                delivered: 0,
                failed: 0,
                skipped: (contacts.len() - addresses.len()) as u64,
                error: None,
            };

            match (&tenant, addresses.is_empty()) {
                (_, true) => {}
                (None, false) => outcome.error = Some(UNLOADED_TENANT.to_string()),
                (Some(tenant), false) => match self
                    .fan_out(
                        tenant,
                        Some(&campaign.created_by),
                        &content,
                        &addresses,
                        Some(&campaign.id),
                        now,
                    )
                    .await
                {
                    Ok(report) => {
                        outcome.delivered = report.delivered;
                        outcome.failed = report.failed;
                    }
                    Err(err) => {
                        tracing::warn!(campaign_id = %campaign.id, channel = %channel, error = %err, "campaign channel not sent");
                        outcome.error = Some(err.to_string());
                    }
                },
            }
            outcomes.push(outcome);
        }

        if let Err(err) = self.refresh_analytics(&campaign.id, now).await {
            tracing::warn!(campaign_id = %campaign.id, error = %err, "failed to refresh campaign analytics");
        }
        let finished = match self
            .store
            .transition_campaign(
                &campaign.id,
                CampaignStatus::Active,
                CampaignStatus::Completed,
                now,
            )
            .await?
        {
            Some(done) => done,
            // canceled while running
            None => self.store.get_campaign(&campaign.tenant_id, &campaign.id).await?,
        };
        tracing::info!(campaign_id = %finished.id, status = ?finished.status, "campaign executed");

        Ok(CampaignRun {
            campaign: finished,
            channels: outcomes,
        })
    }

    /// Starts every scheduled campaign that has come due, up to
    /// `scheduler_batch` per call. A campaign whose recipients cannot be
    /// resolved is canceled.
    pub async fn promote_due_campaigns(&self, now: DateTime<Utc>) -> PromotionReport {
        let mut report = PromotionReport::default();

        for _ in 0..self.config.scheduler_batch.max(0) {
            let campaign = match self.store.claim_due_campaign(now).await {
                Ok(Some(campaign)) => campaign,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "failed to claim due campaign");
                    break;
                }
            };
            report.promoted += 1;
            let (tenant_id, campaign_id) = (campaign.tenant_id.clone(), campaign.id.clone());

            let contacts = match self.resolve_recipients(&campaign).await {
                Ok(contacts) => contacts,
                Err(err) => {
                    tracing::warn!(campaign_id = %campaign_id, error = %err, "canceling campaign with no recipients");
                    if let Err(err) = self.store.cancel_campaign(&tenant_id, &campaign_id, now).await {
                        tracing::error!(campaign_id = %campaign_id, error = %err, "failed to cancel campaign");
                    }
                    report.canceled += 1;
                    continue;
                }
            };

            match self.execute_campaign(campaign, &contacts, now).await {
                Ok(_) => report.completed += 1,
                Err(err) => {
                    tracing::error!(campaign_id = %campaign_id, error = %err, "campaign execution failed");
                    // never leave it active
                    if let Err(err) = self
                        .store
                        .transition_campaign(
                            &campaign_id,
                            CampaignStatus::Active,
                            CampaignStatus::Completed,
                            now,
                        )
                        .await
                    {
                        tracing::error!(campaign_id = %campaign_id, error = %err, "failed to close campaign");
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifyhub_core::types::{LogStatus, RecipientOutcome};
    use notifyhub_core::Credits;

    fn log(outcomes: Vec<RecipientOutcome>) -> DeliveryLog {
        let now = Utc::now();
        DeliveryLog {
            id: "log_1".to_string(),
            tenant_id: "org_1".to_string(),
            channel: Channel::Sms,
            user_id: None,
            recipients: Json(outcomes),
            preview: String::new(),
            message: String::new(),
            subject: None,
            attachments: Json(vec![]),
            cost: Credits::ZERO,
            network: "Lancola SMS".to_string(),
            campaign_id: Some("cmp_1".to_string()),
            scheduled_at: None,
            status: LogStatus::Sent,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_analytics_counts_entries() {
        let logs = vec![
            log(vec![RecipientOutcome::success("a", None)]),
            log(vec![RecipientOutcome::failed("b", "boom")]),
            log(vec![
                RecipientOutcome::success("c", None),
                RecipientOutcome::failed("d", "boom"),
            ]),
        ];
        assert_eq!(
            analytics_from_logs(&logs),
            CampaignAnalytics {
                sent: 3,
                delivered: 2,
                failed: 2
            }
        );
    }

    #[test]
    fn test_create_requires_message_per_channel() {
        let req = CreateCampaign {
            name: "Promo".to_string(),
            channels: vec![Channel::Sms, Channel::Email],
            messages: BTreeMap::from([(
                Channel::Sms,
                ChannelMessage {
                    subject: None,
                    content: "Hi".to_string(),
                    attachments: vec![],
                },
            )]),
            recipient_policy: RecipientPolicy::All,
            selected_contacts: vec![],
            group_id: None,
            scheduled_at: None,
            save_as_draft: false,
        };
        let err = req.validate(Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Message for email is required");
    }
}
