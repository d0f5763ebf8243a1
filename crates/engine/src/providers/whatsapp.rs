use async_trait::async_trait;
use notifyhub_core::providers::{ProviderConfig, WhatsAppCredentials};
use notifyhub_core::types::Channel;
use serde_json::{json, Value};

use super::{OutboundMessage, Provider, ProviderError, ProviderResponse};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// WhatsApp Cloud API. Business-initiated messages go out as a pre-approved
/// template, so the message body is not transmitted.
pub struct WhatsAppCloud {
    client: reqwest::Client,
    base_url: String,
}

impl WhatsAppCloud {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self, creds: &WhatsAppCredentials) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            creds.api_version,
            creds.phone_number_id
        )
    }
}

pub(crate) fn payload(creds: &WhatsAppCredentials, to: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "template",
        "template": {
            "name": creds.template,
            "language": {"code": "en_US"},
        },
    })
}

#[async_trait]
impl Provider for WhatsAppCloud {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        let creds = config.whatsapp()?;
        let resp = self
            .client
            .post(self.messages_url(&creds))
            .bearer_auth(&creds.access_token)
            .json(&payload(&creds, &message.to))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if let Some(error) = body.get("error") {
            let reason = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ProviderError::Rejected(reason.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Rejected(format!("HTTP {}", status.as_u16())));
        }
        Ok(ProviderResponse {
            raw: Some(body.to_string()),
        })
    }
}
