use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use notifyhub_api::{build_router, AppState};
use notifyhub_core::auth::hash_api_key;
use notifyhub_core::config::Settings;
use notifyhub_core::credits::{Credits, RateTable};
use notifyhub_core::providers::{ProviderConfig, ProviderDefaults};
use notifyhub_core::types::{
    Channel, PaymentEnvironment, PaymentMethodKind, Role, TenantStatus,
};
use notifyhub_db::models::{ApiKey, ApiKeyStatus, PaymentMethod, Tenant};
use notifyhub_db::{Json, MemoryStore, Store};
use notifyhub_engine::gateway::{GatewayError, GatewayReceipt, PaymentGateway, StkPush};
use notifyhub_engine::providers::{
    OutboundMessage, Provider, ProviderError, ProviderResponse, Providers,
};
use notifyhub_engine::{Engine, EngineConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "nh_live_admin000000000000000000";
const MEMBER_KEY: &str = "nh_live_member00000000000000000";
const CALLBACK_TOKEN: &str = "cb-secret";

struct AcceptingProvider(Channel);

#[async_trait]
impl Provider for AcceptingProvider {
    fn channel(&self) -> Channel {
        self.0
    }

    async fn send(
        &self,
        _config: &ProviderConfig,
        _message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse { raw: None })
    }
}

struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn access_token(&self, _method: &PaymentMethod) -> Result<String, GatewayError> {
        Ok("token".to_string())
    }

    async fn push_payment_prompt(
        &self,
        _access_token: &str,
        _push: &StkPush,
    ) -> Result<GatewayReceipt, GatewayError> {
        Ok(GatewayReceipt {
            checkout_request_id: "ws_CO_http".to_string(),
            merchant_request_id: "mr_http".to_string(),
            customer_message: Some("Success".to_string()),
        })
    }
}

fn settings() -> Settings {
    Settings {
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        notifyhub_env: "test".to_string(),
        api_bind: "127.0.0.1:0".to_string(),
        rate_limit_per_min: 600,
        tokens_per_unit: Credits::whole(1),
        scheduler_interval_secs: 60,
        scheduler_batch: 100,
        campaign_interval_secs: 300,
        session_ttl_minutes: 1440,
        mpesa_callback_url: Some("https://api.notifyhub.test/transactions/callback".to_string()),
        mpesa_callback_token: Some(CALLBACK_TOKEN.to_string()),
        providers: ProviderDefaults::default(),
    }
}

fn api_key(raw: &str, role: Role) -> ApiKey {
    ApiKey {
        id: format!("key_{}", &raw[8..14]),
        key_hash: hash_api_key(raw),
        key_prefix: raw.chars().take(12).collect(),
        tenant_id: "org_1".to_string(),
        user_id: "usr_1".to_string(),
        role,
        name: None,
        status: ApiKeyStatus::Active,
        last_used_at: None,
        created_at: Utc::now(),
    }
}

async fn app(balance: Credits) -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let rates = RateTable::default();
    store
        .seed_tenant(Tenant {
            id: "org_1".to_string(),
            name: "Acme Ltd".to_string(),
            balance,
            sms_rate: rates.sms,
            email_rate: rates.email,
            whatsapp_rate: rates.whatsapp,
            credentials: Json(HashMap::new()),
            payment_method_id: None,
            status: TenantStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await;
    store
        .seed_payment_method(PaymentMethod {
            id: "pm_default".to_string(),
            name: "Main paybill".to_string(),
            kind: PaymentMethodKind::Paybill,
            shortcode: "12345".to_string(),
            passkey: "passkey".to_string(),
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            environment: PaymentEnvironment::Sandbox,
            is_default: true,
            is_active: true,
            transaction_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
        })
        .await;
    store.seed_api_key(api_key(ADMIN_KEY, Role::Admin)).await;
    store.seed_api_key(api_key(MEMBER_KEY, Role::Member)).await;

    let settings = settings();
    let engine = Engine::new(
        Arc::new(store.clone()),
        Providers::new(
            Arc::new(AcceptingProvider(Channel::Sms)),
            Arc::new(AcceptingProvider(Channel::Email)),
            Arc::new(AcceptingProvider(Channel::Whatsapp)),
        ),
        Arc::new(StubGateway),
        EngineConfig {
            callback_url: settings.mpesa_callback_url.clone(),
            ..EngineConfig::default()
        },
    );

    (build_router(AppState::new(engine, None, settings)), store)
}

fn json_request(method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_store_backend() {
    let (app, _) = app(Credits::ZERO).await;
    let (status, body) = send(&app, json_request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "store": "memory"}));
}

#[tokio::test]
async fn missing_key_is_unauthorized_and_echoes_request_id() {
    let (app, _) = app(Credits::ZERO).await;
    let req = Request::builder()
        .uri("/usage/me")
        .header("x-request-id", "req_client_1")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["x-request-id"], "req_client_1");

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["request_id"], "req_client_1");
}

#[tokio::test]
async fn send_sms_debits_balance() {
    let (app, store) = app(Credits::whole(10)).await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/notifications/send",
            Some(MEMBER_KEY),
            Some(json!({
                "channel": "sms",
                "message": "Your order has shipped",
                "recipients": ["0712345678", "0722000111"]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["delivered"], 2);
    assert_eq!(body["failed"], 0);
    assert_eq!(store.get_tenant("org_1").await.unwrap().balance, Credits::whole(8));

    let (status, usage) = send(&app, json_request("GET", "/usage/me", Some(MEMBER_KEY), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["balance"], 8.0);
}

#[tokio::test]
async fn unaffordable_batch_reports_affordable_count() {
    let (app, store) = app(Credits::whole(1)).await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/notifications/send",
            Some(MEMBER_KEY),
            Some(json!({
                "channel": "sms",
                "message": "Hello",
                "recipients": ["0712345678", "0722000111", "0733000222"]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "insufficient_credit");
    assert_eq!(body["error"]["affordableCount"], 1);
    assert_eq!(store.get_tenant("org_1").await.unwrap().balance, Credits::whole(1));
}

#[tokio::test]
async fn purchase_then_callback_credits_once() {
    let (app, store) = app(Credits::ZERO).await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/transactions/purchase",
            Some(MEMBER_KEY),
            Some(json!({"amount": 50, "phoneNumber": "0712345678"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["transaction"]["status"], "pending");

    let callback = json!({"Body": {"stkCallback": {
        "MerchantRequestID": "mr_http",
        "CheckoutRequestID": "ws_CO_http",
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "CallbackMetadata": {"Item": [{"Name": "MpesaReceiptNumber", "Value": "QK99XYZ"}]}
    }}});
    let uri = format!("/transactions/callback?token={CALLBACK_TOKEN}");
    for _ in 0..2 {
        let (status, ack) = send(&app, json_request("POST", &uri, None, Some(callback.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, json!({"ResultCode": 0, "ResultDesc": "Success"}));
    }
    assert_eq!(store.get_tenant("org_1").await.unwrap().balance, Credits::whole(50));
}

#[tokio::test]
async fn callback_with_wrong_token_is_rejected() {
    let (app, _) = app(Credits::ZERO).await;
    let callback = json!({"Body": {"stkCallback": {
        "CheckoutRequestID": "ws_CO_http",
        "ResultCode": 0,
        "ResultDesc": "ok"
    }}});
    let (status, _) = send(
        &app,
        json_request("POST", "/transactions/callback?token=nope", None, Some(callback)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_need_admin_and_resolve_publicly() {
    let (app, _) = app(Credits::ZERO).await;
    let body = json!({"mode": "flexible", "description": "Top up"});

    let (status, _) = send(
        &app,
        json_request("POST", "/payment-sessions", Some(MEMBER_KEY), Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = send(
        &app,
        json_request("POST", "/payment-sessions", Some(ADMIN_KEY), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let token = created["token"].as_str().unwrap().to_string();
    assert!(token.starts_with("pay_"));

    let (status, view) = send(&app, json_request("GET", &format!("/public/pay/{token}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["tenantName"], "Acme Ltd");
    assert_eq!(view["status"], "pending");

    let (status, started) = send(
        &app,
        json_request(
            "POST",
            &format!("/public/pay/{token}/initiate"),
            None,
            Some(json!({"phoneNumber": "0712345678", "amount": 50})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{started}");
    assert!(started["transactionId"].as_str().is_some());
    assert_eq!(started["checkoutRequestId"], "ws_CO_http");
    for private in ["transaction", "tenantId", "metadata", "paymentMethodId", "phone"] {
        assert!(started.get(private).is_none(), "{private} leaked: {started}");
    }

    let (status, _) = send(&app, json_request("GET", "/public/pay/pay_unknown", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
