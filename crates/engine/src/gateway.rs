//! Mobile-money gateway client (M-Pesa Daraja STK push).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifyhub_core::mpesa::{self, OAuthToken, StkErrorBody, StkPushRequest, StkPushResponse};
use notifyhub_core::types::PaymentMethodKind;
use notifyhub_db::models::PaymentMethod;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway authentication failed: {0}")]
    Auth(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything needed to push a payment prompt to the payer's handset.
#[derive(Debug, Clone)]
pub struct StkPush {
    pub method: PaymentMethod,
    pub amount: u64,
    pub phone: String,
    pub tenant_name: String,
    pub callback_url: String,
    pub timestamp: DateTime<Utc>,
}

impl StkPush {
    pub fn to_request(&self) -> StkPushRequest {
        let timestamp = mpesa::timestamp(self.timestamp);
        let msisdn = mpesa::msisdn(&self.phone);
        let shortcode = self.method.shortcode.clone();
        StkPushRequest {
            password: mpesa::password(&shortcode, &self.method.passkey, &timestamp),
            timestamp,
            transaction_type: match self.method.kind {
                PaymentMethodKind::Till => "CustomerBuyGoodsOnline".to_string(),
                PaymentMethodKind::Paybill => mpesa::transaction_type(&shortcode).to_string(),
            },
            amount: self.amount,
            party_a: msisdn.clone(),
            party_b: shortcode.clone(),
            phone_number: msisdn,
            callback_url: self.callback_url.clone(),
            account_reference: mpesa::account_reference(&self.tenant_name),
            transaction_desc: mpesa::transaction_desc(&self.tenant_name),
            business_short_code: shortcode,
        }
    }
}

/// Correlation ids handed back when a prompt was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn access_token(&self, method: &PaymentMethod) -> Result<String, GatewayError>;

    async fn push_payment_prompt(
        &self,
        access_token: &str,
        push: &StkPush,
    ) -> Result<GatewayReceipt, GatewayError>;
}

pub struct MpesaGateway {
    client: reqwest::Client,
}

impl MpesaGateway {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn access_token(&self, method: &PaymentMethod) -> Result<String, GatewayError> {
        let url = format!("{}{}", mpesa::base_url(method.environment), mpesa::OAUTH_PATH);
        let resp = self
            .client
            .get(url)
            .basic_auth(&method.consumer_key, Some(&method.consumer_secret))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        let token: OAuthToken = resp.json().await?;
        Ok(token.access_token)
    }

    async fn push_payment_prompt(
        &self,
        access_token: &str,
        push: &StkPush,
    ) -> Result<GatewayReceipt, GatewayError> {
        let url = format!(
            "{}{}",
            mpesa::base_url(push.method.environment),
            mpesa::STK_PUSH_PATH
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&push.to_request())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<StkErrorBody>(&body)
                .ok()
                .and_then(|err| err.error_message.or(err.customer_message))
                .unwrap_or(body);
            return Err(GatewayError::Rejected(reason));
        }

        let accepted: StkPushResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Rejected(format!("unreadable response: {e}")))?;
        if accepted.response_code.as_deref().is_some_and(|code| code != "0") {
            return Err(GatewayError::Rejected(
                accepted
                    .customer_message
                    .unwrap_or_else(|| "payment prompt not accepted".to_string()),
            ));
        }
        Ok(GatewayReceipt {
            checkout_request_id: accepted.checkout_request_id,
            merchant_request_id: accepted.merchant_request_id,
            customer_message: accepted.customer_message,
        })
    }
}
