use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "channel_kind", rename_all = "lowercase")
)]
pub enum Channel {
    Sms,
    Email,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Sms, Channel::Email, Channel::Whatsapp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }

    /// SMS and WhatsApp are addressed by phone number, email by address.
    pub fn uses_phone(&self) -> bool {
        matches!(self, Channel::Sms | Channel::Whatsapp)
    }

    /// Provider label recorded on every delivery log entry.
    pub fn network(&self) -> &'static str {
        match self {
            Channel::Sms => "Lancola SMS",
            Channel::Email => "Lancola Email",
            Channel::Whatsapp => "Lancola WhatsApp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "tenant_status", rename_all = "lowercase")
)]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "log_status", rename_all = "lowercase")
)]
pub enum LogStatus {
    Scheduled,
    Processing,
    Sent,
    Failed,
}

impl LogStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogStatus::Sent | LogStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "campaign_status", rename_all = "lowercase")
)]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Completed,
    Canceled,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Canceled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "recipient_policy", rename_all = "lowercase")
)]
pub enum RecipientPolicy {
    All,
    Selected,
    Group,
    Segments,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "transaction_status", rename_all = "lowercase")
)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "session_status", rename_all = "lowercase")
)]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Sessions can only be viewed while a payer may still act on them.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "session_mode", rename_all = "lowercase")
)]
pub enum SessionMode {
    Fixed,
    #[default]
    Flexible,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "payment_environment", rename_all = "lowercase")
)]
pub enum PaymentEnvironment {
    Sandbox,
    Production,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "payment_method_kind", rename_all = "lowercase")
)]
pub enum PaymentMethodKind {
    Paybill,
    Till,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "member_role", rename_all = "lowercase")
)]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub status: RecipientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl RecipientOutcome {
    pub fn pending(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: RecipientStatus::Pending,
            error: None,
            response: None,
        }
    }

    pub fn success(recipient: impl Into<String>, response: Option<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: RecipientStatus::Success,
            error: None,
            response,
        }
    }

    pub fn failed(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: RecipientStatus::Failed,
            error: Some(error.into()),
            response: None,
        }
    }
}

/// Email attachment. `content` is base64 and is only persisted for entries
/// that still have to be sent (scheduled entries).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Attachment {
    pub fn without_content(&self) -> Attachment {
        Attachment {
            content: None,
            ..self.clone()
        }
    }
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignAnalytics {
    pub sent: u32,
    pub delivered: u32,
    pub failed: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Channel::Whatsapp).unwrap(), "\"whatsapp\"");
        let parsed: Channel = serde_json::from_str("\"sms\"").unwrap();
        assert_eq!(parsed, Channel::Sms);
    }

    #[test]
    fn test_channel_addressing() {
        assert!(Channel::Sms.uses_phone());
        assert!(Channel::Whatsapp.uses_phone());
        assert!(!Channel::Email.uses_phone());
    }

    #[test]
    fn test_channel_as_map_key() {
        let mut messages = std::collections::BTreeMap::new();
        messages.insert(
            Channel::Email,
            ChannelMessage {
                subject: Some("Hi".to_string()),
                content: "Body".to_string(),
                attachments: vec![],
            },
        );
        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json["email"]["subject"], "Hi");
    }

    #[test]
    fn test_terminal_states() {
        assert!(LogStatus::Sent.is_terminal());
        assert!(!LogStatus::Processing.is_terminal());
        assert!(CampaignStatus::Canceled.is_terminal());
        assert!(!CampaignStatus::Scheduled.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Completed.is_open());
    }

    #[test]
    fn test_attachment_defaults_content_type() {
        let att: Attachment = serde_json::from_str(r#"{"filename":"a.pdf"}"#).unwrap();
        assert_eq!(att.content_type, "application/octet-stream");
        assert!(att.content.is_none());
    }

    #[test]
    fn test_recipient_outcome_omits_empty_fields() {
        let json = serde_json::to_string(&RecipientOutcome::pending("254700000000")).unwrap();
        assert_eq!(json, r#"{"recipient":"254700000000","status":"pending"}"#);
    }
}
