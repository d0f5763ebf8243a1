//! M-Pesa (Daraja) STK push wire types and request helpers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PaymentEnvironment;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";
pub const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
pub const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
/// Largest amount Daraja accepts for a single STK push.
pub const MAX_STK_AMOUNT: u64 = 250_000;

pub fn base_url(environment: PaymentEnvironment) -> &'static str {
    match environment {
        PaymentEnvironment::Sandbox => SANDBOX_BASE_URL,
        PaymentEnvironment::Production => PRODUCTION_BASE_URL,
    }
}

/// `YYYYMMDDHHMMSS`
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Till numbers are longer than paybill shortcodes.
pub fn transaction_type(shortcode: &str) -> &'static str {
    if shortcode.len() > 5 {
        "CustomerBuyGoodsOnline"
    } else {
        "CustomerPayBillOnline"
    }
}

pub fn account_reference(tenant_name: &str) -> String {
    let compact: String = tenant_name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("Topup-{}", compact).chars().take(12).collect()
}

pub fn transaction_desc(tenant_name: &str) -> String {
    format!("Token Purchase for {}", tenant_name)
        .chars()
        .take(20)
        .collect()
}

/// Daraja expects the MSISDN without a leading `+`.
pub fn msisdn(phone: &str) -> String {
    phone.trim().trim_start_matches('+').to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

/// Error body Daraja returns on a rejected push.
#[derive(Debug, Clone, Deserialize)]
pub struct StkErrorBody {
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

/// Gateway-neutral view of a payment result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub checkout_request_id: String,
    pub success: bool,
    pub result_code: i64,
    pub result_desc: String,
    pub settlement_reference: Option<String>,
}

impl StkCallback {
    pub fn metadata_value(&self, name: &str) -> Option<String> {
        self.callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| match item.value.as_ref()? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
    }
}

impl From<CallbackEnvelope> for GatewayCallback {
    fn from(envelope: CallbackEnvelope) -> Self {
        let cb = envelope.body.stk_callback;
        let settlement_reference = cb.metadata_value("MpesaReceiptNumber");
        GatewayCallback {
            success: cb.result_code == 0,
            checkout_request_id: cb.checkout_request_id,
            result_code: cb.result_code,
            result_desc: cb.result_desc,
            settlement_reference,
        }
    }
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Success".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            result_code: 1,
            result_desc: "Transaction not found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_password_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let ts = timestamp(now);
        assert_eq!(ts, "20240307090501");
        let pw = password("174379", "passkey", &ts);
        assert_eq!(
            STANDARD.decode(pw).unwrap(),
            b"174379passkey20240307090501".to_vec()
        );
    }

    #[test]
    fn test_transaction_type_by_shortcode_length() {
        assert_eq!(transaction_type("12345"), "CustomerPayBillOnline");
        assert_eq!(transaction_type("5123456"), "CustomerBuyGoodsOnline");
    }

    #[test]
    fn test_reference_and_desc_truncated() {
        assert_eq!(account_reference("Acme Widgets Ltd"), "Topup-AcmeWi");
        assert_eq!(transaction_desc("Acme Widgets Ltd"), "Token Purchase for A");
        assert_eq!(account_reference("Jo"), "Topup-Jo");
    }

    #[test]
    fn test_stk_request_field_names() {
        let req = StkPushRequest {
            business_short_code: "174379".into(),
            password: "pw".into(),
            timestamp: "20240101000000".into(),
            transaction_type: "CustomerPayBillOnline".into(),
            amount: 150,
            party_a: "254712345678".into(),
            party_b: "174379".into(),
            phone_number: "254712345678".into(),
            callback_url: "https://hooks.example/cb".into(),
            account_reference: "Topup-Acme".into(),
            transaction_desc: "Token Purchase for A".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["CallBackURL"], "https://hooks.example/cb");
        assert_eq!(json["PartyA"], "254712345678");
        assert_eq!(json["Amount"], 150);
    }

    #[test]
    fn test_success_callback_normalised() {
        let body = serde_json::json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "m-1",
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {"Item": [
                    {"Name": "Amount", "Value": 150},
                    {"Name": "MpesaReceiptNumber", "Value": "QK12ABC"},
                    {"Name": "Balance"},
                    {"Name": "PhoneNumber", "Value": 254712345678u64}
                ]}
            }}
        });
        let envelope: CallbackEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(
            envelope.body.stk_callback.metadata_value("PhoneNumber").as_deref(),
            Some("254712345678")
        );
        let cb = GatewayCallback::from(envelope);
        assert!(cb.success);
        assert_eq!(cb.checkout_request_id, "ws_CO_1");
        assert_eq!(cb.settlement_reference.as_deref(), Some("QK12ABC"));
    }

    #[test]
    fn test_failure_callback_without_metadata() {
        let body = serde_json::json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "m-2",
                "CheckoutRequestID": "ws_CO_2",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        });
        let cb = GatewayCallback::from(serde_json::from_value::<CallbackEnvelope>(body).unwrap());
        assert!(!cb.success);
        assert_eq!(cb.result_code, 1032);
        assert_eq!(cb.settlement_reference, None);
    }

    #[test]
    fn test_ack_shape() {
        let json = serde_json::to_value(CallbackAck::not_found()).unwrap();
        assert_eq!(json, serde_json::json!({"ResultCode": 1, "ResultDesc": "Transaction not found"}));
    }
}
