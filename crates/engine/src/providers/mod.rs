//! Channel provider adapters behind one `Provider` trait.

use async_trait::async_trait;
use notifyhub_core::providers::{MissingCredential, ProviderConfig};
use notifyhub_core::types::{Attachment, Channel};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod email;
pub mod sms;
pub mod whatsapp;

pub use email::HttpEmail;
pub use sms::LancolaSms;
pub use whatsapp::WhatsAppCloud;

/// A single-recipient message, already addressed in the form the provider
/// expects (normalised phone number or email address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    pub raw: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Credentials(#[from] MissingCredential),
    #[error("rejected by provider: {0}")]
    Rejected(String),
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// One provider per channel.
#[derive(Clone)]
pub struct Providers {
    sms: Arc<dyn Provider>,
    email: Arc<dyn Provider>,
    whatsapp: Arc<dyn Provider>,
}

impl Providers {
    pub fn new(
        sms: Arc<dyn Provider>,
        email: Arc<dyn Provider>,
        whatsapp: Arc<dyn Provider>,
    ) -> Self {
        Self {
            sms,
            email,
            whatsapp,
        }
    }

    /// HTTP adapters sharing one client.
    pub fn http(client: reqwest::Client) -> Self {
        Self::new(
            Arc::new(LancolaSms::new(client.clone())),
            Arc::new(HttpEmail::new(client.clone())),
            Arc::new(WhatsAppCloud::new(client)),
        )
    }

    pub fn for_channel(&self, channel: Channel) -> &Arc<dyn Provider> {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Email => &self.email,
            Channel::Whatsapp => &self.whatsapp,
        }
    }
}

pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
}
