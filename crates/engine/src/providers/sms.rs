use async_trait::async_trait;
use notifyhub_core::providers::{ProviderConfig, SmsCredentials};
use notifyhub_core::types::Channel;
use reqwest::Url;

use super::{OutboundMessage, Provider, ProviderError, ProviderResponse};

/// Bulk SMS gateway driven by a single GET request. The configured base URL
/// ends with the api-key query parameter name, e.g. `https://host/send?apikey=`.
pub struct LancolaSms {
    client: reqwest::Client,
}

impl LancolaSms {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn send_url(
    creds: &SmsCredentials,
    mobile: &str,
    message: &str,
) -> Result<Url, ProviderError> {
    let mut url = Url::parse(&format!("{}{}", creds.api_url, creds.api_key))
        .map_err(|e| ProviderError::Rejected(format!("invalid sms api url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("partnerID", &creds.partner_id)
        .append_pair("message", message)
        .append_pair("shortcode", &creds.shortcode)
        .append_pair("mobile", mobile);
    Ok(url)
}

#[async_trait]
impl Provider for LancolaSms {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        let creds = config.sms()?;
        let url = send_url(&creds, &message.to, &message.body)?;

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        Ok(ProviderResponse { raw: Some(body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_url_encodes_message() {
        let creds = SmsCredentials {
            api_url: "https://sms.example.com/api/services/sendsms/?apikey=".to_string(),
            api_key: "k123".to_string(),
            partner_id: "8029".to_string(),
            shortcode: "NOTIFY".to_string(),
        };
        let url = send_url(&creds, "254712345678", "Hello & welcome").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("apikey".to_string(), "k123".to_string()),
                ("partnerID".to_string(), "8029".to_string()),
                ("message".to_string(), "Hello & welcome".to_string()),
                ("shortcode".to_string(), "NOTIFY".to_string()),
                ("mobile".to_string(), "254712345678".to_string()),
            ]
        );
    }
}
