#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use notifyhub_core::credits::{Credits, RateTable};
use notifyhub_core::providers::ProviderConfig;
use notifyhub_core::types::{Channel, PaymentEnvironment, PaymentMethodKind, TenantStatus};
use notifyhub_db::models::{Contact, PaymentMethod, Tenant};
use notifyhub_db::{Json, MemoryStore};
use notifyhub_engine::gateway::{GatewayError, GatewayReceipt, PaymentGateway, StkPush};
use notifyhub_engine::providers::{
    OutboundMessage, Provider, ProviderError, ProviderResponse, Providers,
};
use notifyhub_engine::{Engine, EngineConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const TENANT: &str = "org_1";

pub struct FakeProvider {
    channel: Channel,
    failing: AtomicBool,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl FakeProvider {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        _config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("provider unavailable".to_string()));
        }
        Ok(ProviderResponse {
            raw: Some("accepted".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeGateway {
    failing: AtomicBool,
    pushes: AtomicU32,
    last: Mutex<Option<StkPush>>,
}

impl FakeGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> u32 {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn last_push(&self) -> Option<StkPush> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn access_token(&self, _method: &PaymentMethod) -> Result<String, GatewayError> {
        Ok("access-token".to_string())
    }

    async fn push_payment_prompt(
        &self,
        _access_token: &str,
        push: &StkPush,
    ) -> Result<GatewayReceipt, GatewayError> {
        *self.last.lock().unwrap() = Some(push.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("The initiator information is invalid".to_string()));
        }
        let n = self.pushes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayReceipt {
            checkout_request_id: format!("ws_CO_{n}"),
            merchant_request_id: format!("mr_{n}"),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: MemoryStore,
    pub sms: Arc<FakeProvider>,
    pub email: Arc<FakeProvider>,
    pub whatsapp: Arc<FakeProvider>,
    pub gateway: Arc<FakeGateway>,
}

pub fn tenant(id: &str, balance: Credits) -> Tenant {
    let rates = RateTable::default();
    Tenant {
        id: id.to_string(),
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
    }
}

pub fn payment_method(id: &str, is_default: bool) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        name: "Main paybill".to_string(),
        kind: PaymentMethodKind::Paybill,
        shortcode: "12345".to_string(),
        passkey: "passkey".to_string(),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        environment: PaymentEnvironment::Sandbox,
        is_default,
        is_active: true,
        transaction_count: 0,
        last_used_at: None,
        created_at: Utc::now(),
    }
}

pub fn contact(id: &str, phone: Option<&str>, email: Option<&str>, groups: &[&str]) -> Contact {
    Contact {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("Contact {id}"),
        phone: phone.map(str::to_string),
        email: email.map(str::to_string),
        group_ids: groups.iter().map(|g| g.to_string()).collect(),
        created_at: Utc::now(),
    }
}

pub async fn harness(balance: Credits) -> Harness {
    let store = MemoryStore::new();
    store.seed_tenant(tenant(TENANT, balance)).await;
    store.seed_payment_method(payment_method("pm_default", true)).await;

    let sms = FakeProvider::new(Channel::Sms);
    let email = FakeProvider::new(Channel::Email);
    let whatsapp = FakeProvider::new(Channel::Whatsapp);
    let gateway = Arc::new(FakeGateway::default());

    let config = EngineConfig {
        callback_url: Some("https://api.notifyhub.test/transactions/callback".to_string()),
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        Arc::new(store.clone()),
        Providers::new(sms.clone(), email.clone(), whatsapp.clone()),
        gateway.clone(),
        config,
    );

    Harness {
        engine,
        store,
        sms,
        email,
        whatsapp,
        gateway,
    }
}

impl Harness {
    pub async fn balance(&self) -> Credits {
        self.engine.ledger().balance(TENANT).await.unwrap()
    }
}
