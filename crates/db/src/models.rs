use chrono::{DateTime, Utc};
use notifyhub_core::credits::{Credits, RateTable};
use notifyhub_core::types::{
    Attachment, CampaignAnalytics, CampaignStatus, Channel, ChannelMessage, LogStatus,
    PaymentEnvironment, PaymentMethodKind, RecipientOutcome, RecipientPolicy, Role, SessionMode,
    SessionStatus, TenantStatus, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "api_key_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub balance: Credits,
    pub sms_rate: Credits,
    pub email_rate: Credits,
    pub whatsapp_rate: Credits,
    #[serde(skip_serializing)]
    pub credentials: Json<HashMap<String, String>>,
    pub payment_method_id: Option<String>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn rates(&self) -> RateTable {
        RateTable {
            sms: self.sms_rate,
            email: self.email_rate,
            whatsapp: self.whatsapp_rate,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,
    pub status: ApiKeyStatus,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub group_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Address used on `channel`, if the contact has one.
    pub fn address(&self, channel: Channel) -> Option<&str> {
        let field = if channel.uses_phone() {
            self.phone.as_deref()
        } else {
            self.email.as_deref()
        };
        field.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLog {
    pub id: String,
    pub tenant_id: String,
    pub channel: Channel,
    pub user_id: Option<String>,
    pub recipients: Json<Vec<RecipientOutcome>>,
    pub preview: String,
    pub message: String,
    pub subject: Option<String>,
    pub attachments: Json<Vec<Attachment>>,
    pub cost: Credits,
    pub network: String,
    pub campaign_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: LogStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub channel: Option<Channel>,
    pub status: Option<LogStatus>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUsage {
    pub channel: Channel,
    pub messages: i64,
    pub failed: i64,
    pub credits_used: Credits,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub created_by: String,
    pub name: String,
    pub channels: Json<Vec<Channel>>,
    pub messages: Json<BTreeMap<Channel, ChannelMessage>>,
    pub recipient_policy: RecipientPolicy,
    pub selected_contacts: Vec<String>,
    pub group_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub analytics: Json<CampaignAnalytics>,
    pub launched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub kind: PaymentMethodKind,
    pub shortcode: String,
    #[serde(skip_serializing)]
    pub passkey: String,
    #[serde(skip_serializing)]
    pub consumer_key: String,
    #[serde(skip_serializing)]
    pub consumer_secret: String,
    pub environment: PaymentEnvironment,
    pub is_default: bool,
    pub is_active: bool,
    pub transaction_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub amount: Credits,
    pub tokens: Credits,
    pub payment_method_id: Option<String>,
    pub session_token: Option<String>,
    pub phone: String,
    pub status: TransactionStatus,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub settlement_reference: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub token: String,
    pub tenant_id: String,
    pub mode: SessionMode,
    pub amount: Option<Credits>,
    pub credits_per_unit: Credits,
    pub rates: Json<RateTable>,
    pub description: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub phone: Option<String>,
    pub transaction_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
