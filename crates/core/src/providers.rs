//! Layered provider configuration.
//!
//! Process-wide defaults are loaded once at start-up; each tenant may carry
//! credential overrides. [`ProviderConfig::resolve`] merges the two for a
//! single send so business logic never reads the environment directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub country_code: String,
    pub sms_api_url: Option<String>,
    pub sms_api_key: Option<String>,
    pub sms_partner_id: Option<String>,
    pub sms_shortcode: Option<String>,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_api_version: Option<String>,
    pub whatsapp_template: Option<String>,
}

impl ProviderDefaults {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            country_code: var("NOTIFYHUB_DEFAULT_COUNTRY_CODE").unwrap_or_else(|| "254".to_string()),
            sms_api_url: var("SMS_API_URL"),
            sms_api_key: var("SMS_API_KEY"),
            sms_partner_id: var("SMS_PARTNER_ID"),
            sms_shortcode: var("SMS_SHORTCODE"),
            email_api_url: var("EMAIL_API_URL"),
            email_api_key: var("EMAIL_API_KEY"),
            email_from: var("EMAIL_FROM"),
            whatsapp_access_token: var("WHATSAPP_ACCESS_TOKEN"),
            whatsapp_phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID"),
            whatsapp_api_version: var("WHATSAPP_API_VERSION"),
            whatsapp_template: var("WHATSAPP_TEMPLATE"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing provider credential: {0}")]
pub struct MissingCredential(pub &'static str);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsCredentials {
    pub api_url: String,
    pub api_key: String,
    pub partner_id: String,
    pub shortcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCredentials {
    pub api_url: String,
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppCredentials {
    pub access_token: String,
    pub phone_number_id: String,
    pub api_version: String,
    pub template: String,
}

/// Effective settings for one tenant's send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub country_code: String,
    pub sender_name: String,
    values: HashMap<&'static str, String>,
}

const KEYS: [(&str, fn(&ProviderDefaults) -> Option<String>); 11] = [
    ("sms_api_url", |d| d.sms_api_url.clone()),
    ("sms_api_key", |d| d.sms_api_key.clone()),
    ("sms_partner_id", |d| d.sms_partner_id.clone()),
    ("sms_shortcode", |d| d.sms_shortcode.clone()),
    ("email_api_url", |d| d.email_api_url.clone()),
    ("email_api_key", |d| d.email_api_key.clone()),
    ("email_from", |d| d.email_from.clone()),
    ("whatsapp_access_token", |d| d.whatsapp_access_token.clone()),
    ("whatsapp_phone_number_id", |d| d.whatsapp_phone_number_id.clone()),
    ("whatsapp_api_version", |d| d.whatsapp_api_version.clone()),
    ("whatsapp_template", |d| d.whatsapp_template.clone()),
];

impl ProviderConfig {
    /// Tenant overrides win over process defaults; blank overrides are ignored.
    pub fn resolve(
        overrides: &HashMap<String, String>,
        defaults: &ProviderDefaults,
        tenant_name: &str,
    ) -> Self {
        let pick = |key: &str| {
            overrides
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut values = HashMap::new();
        for (key, default) in KEYS {
            if let Some(value) = pick(key).or_else(|| default(defaults)) {
                values.insert(key, value);
            }
        }

        let country_code = pick("country_code").unwrap_or_else(|| defaults.country_code.clone());
        let sender_name = pick("email_from_name").unwrap_or_else(|| {
            if tenant_name.trim().is_empty() {
                "NotifyHub".to_string()
            } else {
                tenant_name.to_string()
            }
        });

        Self {
            country_code,
            sender_name,
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &'static str) -> Result<String, MissingCredential> {
        self.get(key)
            .map(str::to_string)
            .ok_or(MissingCredential(key))
    }

    pub fn sms(&self) -> Result<SmsCredentials, MissingCredential> {
        Ok(SmsCredentials {
            api_url: self.require("sms_api_url")?,
            api_key: self.require("sms_api_key")?,
            partner_id: self.require("sms_partner_id")?,
            shortcode: self.require("sms_shortcode")?,
        })
    }

    pub fn email(&self) -> Result<EmailCredentials, MissingCredential> {
        Ok(EmailCredentials {
            api_url: self.require("email_api_url")?,
            api_key: self.require("email_api_key")?,
            from_email: self.require("email_from")?,
            from_name: self.sender_name.clone(),
        })
    }

    pub fn whatsapp(&self) -> Result<WhatsAppCredentials, MissingCredential> {
        Ok(WhatsAppCredentials {
            access_token: self.require("whatsapp_access_token")?,
            phone_number_id: self.require("whatsapp_phone_number_id")?,
            api_version: self.require("whatsapp_api_version")?,
            template: self.require("whatsapp_template")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ProviderDefaults {
        ProviderDefaults {
            country_code: "254".to_string(),
            sms_api_url: Some("https://sms.example/send?apikey=".to_string()),
            sms_api_key: Some("process-key".to_string()),
            sms_partner_id: Some("8029".to_string()),
            sms_shortcode: Some("NOTIFY".to_string()),
            email_from: Some("noreply@example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_used_without_overrides() {
        let config = ProviderConfig::resolve(&HashMap::new(), &defaults(), "Acme");
        let sms = config.sms().unwrap();
        assert_eq!(sms.api_key, "process-key");
        assert_eq!(config.country_code, "254");
        assert_eq!(config.sender_name, "Acme");
    }

    #[test]
    fn test_tenant_override_wins() {
        let overrides = HashMap::from([
            ("sms_api_key".to_string(), "tenant-key".to_string()),
            ("country_code".to_string(), "256".to_string()),
        ]);
        let config = ProviderConfig::resolve(&overrides, &defaults(), "Acme");
        assert_eq!(config.sms().unwrap().api_key, "tenant-key");
        assert_eq!(config.sms().unwrap().partner_id, "8029");
        assert_eq!(config.country_code, "256");
    }

    #[test]
    fn test_blank_override_falls_back() {
        let overrides = HashMap::from([("sms_api_key".to_string(), "  ".to_string())]);
        let config = ProviderConfig::resolve(&overrides, &defaults(), "Acme");
        assert_eq!(config.sms().unwrap().api_key, "process-key");
    }

    #[test]
    fn test_missing_credentials_named() {
        let config = ProviderConfig::resolve(&HashMap::new(), &defaults(), "Acme");
        assert_eq!(config.email().unwrap_err(), MissingCredential("email_api_url"));
        assert_eq!(
            config.whatsapp().unwrap_err(),
            MissingCredential("whatsapp_access_token")
        );
    }

    #[test]
    fn test_sender_name_fallback() {
        let config = ProviderConfig::resolve(&HashMap::new(), &defaults(), "");
        assert_eq!(config.sender_name, "NotifyHub");
        let overrides = HashMap::from([("email_from_name".to_string(), "Ops".to_string())]);
        let config = ProviderConfig::resolve(&overrides, &defaults(), "Acme");
        assert_eq!(config.sender_name, "Ops");
    }
}
