//! Credit top-ups through the mobile-money gateway.
//!
//! A transaction is created `pending`, the gateway pushes a prompt to the
//! payer, and the asynchronous callback moves it to `completed` (crediting
//! the tenant) or `failed`. Both terminal moves are conditional on the
//! transaction still being pending, so a replayed callback never credits
//! twice.

use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::mpesa::{CallbackAck, GatewayCallback, MAX_STK_AMOUNT};
use notifyhub_core::phone;
use notifyhub_core::types::TransactionStatus;
use notifyhub_db::models::{PaymentMethod, Tenant, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{EngineError, EngineResult};
use crate::gateway::StkPush;
use crate::Engine;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub amount: u64,
    pub phone_number: String,
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStarted {
    pub transaction: Transaction,
    pub customer_message: Option<String>,
}

/// Internal description of one top-up attempt.
pub(crate) struct TopUp<'a> {
    pub tenant: &'a Tenant,
    pub user_id: Option<&'a str>,
    pub method: PaymentMethod,
    pub amount: u64,
    pub phone: &'a str,
    pub tokens_per_unit: Credits,
    pub session_token: Option<&'a str>,
}

/// Whole credits bought by `amount` at `rate`, rounded down.
pub fn tokens_for(amount: u64, rate: Credits) -> Credits {
    let exact = Credits::whole(amount as i64).scale_by(rate);
    Credits::whole(exact.floor_units().max(0))
}

/// Inputs a top-up needs before anything is written.
pub(crate) struct Preflight {
    pub phone: String,
    pub callback_url: String,
}

impl Engine {
    /// Checks amount bounds, the payer's phone and gateway configuration.
    /// Has no side effects.
    pub(crate) fn top_up_preflight(
        &self,
        tenant: &Tenant,
        amount: u64,
        raw_phone: &str,
    ) -> EngineResult<Preflight> {
        if !(1..=MAX_STK_AMOUNT).contains(&amount) {
            return Err(EngineError::validation(format!(
                "Amount must be between 1 and {MAX_STK_AMOUNT}"
            )));
        }
        let country_code = self.provider_config(tenant).country_code;
        let phone = phone::normalize(raw_phone, &country_code);
        if !phone::is_dialable(&phone) {
            return Err(EngineError::validation("A valid phone number is required"));
        }
        let callback_url = self
            .config
            .callback_url
            .clone()
            .ok_or_else(|| EngineError::Gateway("payment callback URL is not configured".into()))?;
        Ok(Preflight {
            phone,
            callback_url,
        })
    }

    /// Explicit method, then the tenant's assigned one, then the system
    /// default. Only active methods qualify.
    pub async fn resolve_payment_method(
        &self,
        tenant: &Tenant,
        explicit: Option<&str>,
    ) -> EngineResult<PaymentMethod> {
        if let Some(id) = explicit {
            let method = self
                .store
                .get_payment_method(id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("payment method {id}")))?;
            if !method.is_active {
                return Err(EngineError::validation("Payment method is not active"));
            }
            return Ok(method);
        }

        if let Some(id) = tenant.payment_method_id.as_deref() {
            match self.store.get_payment_method(id).await? {
                Some(method) if method.is_active => return Ok(method),
                _ => tracing::debug!(tenant_id = %tenant.id, payment_method_id = id, "assigned payment method unavailable"),
            }
        }

        self.store
            .default_payment_method()
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| EngineError::validation("No active payment method available"))
    }

    pub async fn initiate_payment(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        req: PurchaseRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentStarted> {
        let tenant = self.active_tenant(tenant_id).await?;
        let method = self
            .resolve_payment_method(&tenant, req.payment_method_id.as_deref())
            .await?;
        self.start_top_up(
            TopUp {
                tenant: &tenant,
                user_id,
                method,
                amount: req.amount,
                phone: &req.phone_number,
                tokens_per_unit: self.config.tokens_per_unit,
                session_token: None,
            },
            now,
        )
        .await
    }

    pub(crate) async fn start_top_up(
        &self,
        top_up: TopUp<'_>,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentStarted> {
        let Preflight {
            phone,
            callback_url,
        } = self.top_up_preflight(top_up.tenant, top_up.amount, top_up.phone)?;

        let tokens = tokens_for(top_up.amount, top_up.tokens_per_unit);
        let txn = Transaction {
            id: format!("txn_{}", nanoid::nanoid!(21)),
            tenant_id: top_up.tenant.id.clone(),
            user_id: top_up.user_id.map(str::to_string),
            amount: Credits::whole(top_up.amount as i64),
            tokens,
            payment_method_id: Some(top_up.method.id.clone()),
            session_token: top_up.session_token.map(str::to_string),
            phone: phone.clone(),
            status: TransactionStatus::Pending,
            checkout_request_id: None,
            merchant_request_id: None,
            settlement_reference: None,
            description: format!("Purchase of {} credits", tokens),
            metadata: json!({
                "phoneNumber": phone,
                "initiatedAt": now,
                "environment": top_up.method.environment,
                "paymentMethodId": top_up.method.id,
            }),
            created_at: now,
            updated_at: now,
        };
        let txn = self.store.insert_transaction(txn).await?;
        if let Err(err) = self
            .store
            .record_payment_method_usage(&top_up.method.id, now)
            .await
        {
            tracing::warn!(payment_method_id = %top_up.method.id, error = %err, "failed to record payment method usage");
        }

        let push = StkPush {
            method: top_up.method,
            amount: top_up.amount,
            phone,
            tenant_name: top_up.tenant.name.clone(),
            callback_url,
            timestamp: now,
        };
        let pushed = match self.gateway.access_token(&push.method).await {
            Ok(token) => self.gateway.push_payment_prompt(&token, &push).await,
            Err(err) => Err(err),
        };

        let receipt = match pushed {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(transaction_id = %txn.id, tenant_id = %txn.tenant_id, error = %err, "payment prompt failed");
                let audit = json!({"error": err.to_string(), "failedAt": now});
                if let Err(store_err) = self.store.fail_transaction(&txn.id, &audit, now).await {
                    tracing::error!(transaction_id = %txn.id, error = %store_err, "failed to record payment failure");
                }
                return Err(EngineError::Gateway(err.to_string()));
            }
        };

        let audit = json!({
            "checkoutRequestId": receipt.checkout_request_id,
            "merchantRequestId": receipt.merchant_request_id,
            "customerMessage": receipt.customer_message,
        });
        let txn = match self
            .store
            .attach_gateway(
                &txn.id,
                &receipt.checkout_request_id,
                &receipt.merchant_request_id,
                &audit,
                now,
            )
            .await?
        {
            Some(updated) => updated,
            None => self.store.get_transaction(&txn.tenant_id, &txn.id).await?,
        };

        if let Some(token) = top_up.session_token {
            self.store
                .link_session_transaction(token, &txn.id, Some(&receipt.checkout_request_id), now)
                .await?;
        }

        tracing::info!(
            transaction_id = %txn.id,
            tenant_id = %txn.tenant_id,
            amount = top_up.amount,
            tokens = %txn.tokens,
            checkout_request_id = %receipt.checkout_request_id,
            "payment prompt sent"
        );
        Ok(PaymentStarted {
            transaction: txn,
            customer_message: receipt.customer_message,
        })
    }

    /// Applies a gateway result. Unknown correlation ids and already-final
    /// transactions are acknowledged without side effects.
    pub async fn handle_payment_callback(
        &self,
        callback: GatewayCallback,
        now: DateTime<Utc>,
    ) -> EngineResult<CallbackAck> {
        let Some(txn) = self
            .store
            .find_transaction_by_checkout(&callback.checkout_request_id)
            .await?
        else {
            tracing::warn!(checkout_request_id = %callback.checkout_request_id, "callback for unknown transaction");
            return Ok(CallbackAck::not_found());
        };

        if txn.status.is_terminal() {
            tracing::info!(transaction_id = %txn.id, status = ?txn.status, "duplicate callback ignored");
            return Ok(CallbackAck::accepted());
        }

        let audit = json!({
            "callback": {
                "resultCode": callback.result_code,
                "resultDesc": callback.result_desc,
                "receivedAt": now,
            }
        });

        if callback.success {
            match self
                .store
                .settle_transaction(
                    &txn.id,
                    callback.settlement_reference.as_deref(),
                    &audit,
                    now,
                )
                .await?
            {
                Some(settlement) => tracing::info!(
                    transaction_id = %txn.id,
                    tenant_id = %txn.tenant_id,
                    credited = %settlement.transaction.tokens,
                    balance = %settlement.balance,
                    "payment settled"
                ),
                None => tracing::info!(transaction_id = %txn.id, "transaction settled concurrently"),
            }
        } else {
            self.store.fail_transaction(&txn.id, &audit, now).await?;
            tracing::info!(
                transaction_id = %txn.id,
                result_code = callback.result_code,
                result_desc = %callback.result_desc,
                "payment failed"
            );
        }
        Ok(CallbackAck::accepted())
    }

    pub async fn list_transactions(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> EngineResult<Vec<Transaction>> {
        Ok(self.store.list_transactions(tenant_id, limit).await?)
    }

    pub async fn get_transaction(&self, tenant_id: &str, id: &str) -> EngineResult<Transaction> {
        Ok(self.store.get_transaction(tenant_id, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_floor_to_whole_credits() {
        assert_eq!(tokens_for(150, Credits::whole(1)), Credits::whole(150));
        assert_eq!(tokens_for(3, Credits::from_cents(150)), Credits::whole(4));
        assert_eq!(tokens_for(10, Credits::from_cents(25)), Credits::whole(2));
    }
}
