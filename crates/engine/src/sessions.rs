//! Shareable, time-boxed payment links. A session is claimed exactly once
//! (`pending -> processing`); the transaction it starts completes or fails
//! it from the callback path.

use chrono::{DateTime, Duration, Utc};
use notifyhub_core::auth::generate_session_token;
use notifyhub_core::credits::{Credits, RateTable};
use notifyhub_core::mpesa::MAX_STK_AMOUNT;
use notifyhub_core::types::{SessionMode, SessionStatus};
use notifyhub_db::models::PaymentSession;
use notifyhub_db::Json;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::payments::{PaymentStarted, TopUp};
use crate::Engine;

const MAX_TTL_MINUTES: i64 = 30 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayment {
    pub phone_number: String,
    #[serde(default)]
    pub amount: Option<u64>,
}

/// What an unauthenticated payer is allowed to see.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSession {
    pub token: String,
    pub tenant_name: String,
    pub mode: SessionMode,
    pub amount: Option<Credits>,
    pub credits_per_unit: Credits,
    pub rates: RateTable,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
}

impl Engine {
    pub async fn create_session(
        &self,
        tenant_id: &str,
        user_id: &str,
        req: CreateSession,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentSession> {
        let tenant = self.active_tenant(tenant_id).await?;
        let amount = match (req.mode, req.amount) {
            (SessionMode::Fixed, Some(amount)) if (1..=MAX_STK_AMOUNT).contains(&amount) => {
                Some(Credits::whole(amount as i64))
            }
            (SessionMode::Fixed, _) => {
                return Err(EngineError::validation(format!(
                    "Fixed sessions need an amount between 1 and {MAX_STK_AMOUNT}"
                )))
            }
            (SessionMode::Flexible, _) => None,
        };
        let ttl = req.ttl_minutes.unwrap_or(self.config.session_ttl_minutes);
        if !(1..=MAX_TTL_MINUTES).contains(&ttl) {
            return Err(EngineError::validation(format!(
                "ttlMinutes must be between 1 and {MAX_TTL_MINUTES}"
            )));
        }

        let session = PaymentSession {
            token: generate_session_token(),
            tenant_id: tenant.id.clone(),
            mode: req.mode,
            amount,
            credits_per_unit: self.config.tokens_per_unit,
            rates: Json(tenant.rates()),
            description: req.description.filter(|d| !d.trim().is_empty()),
            expires_at: now + Duration::minutes(ttl),
            status: SessionStatus::Pending,
            phone: None,
            transaction_id: None,
            checkout_request_id: None,
            created_by: Some(user_id.to_string()),
            created_at: now,
            updated_at: now,
        };
        let session = self.store.insert_session(session).await?;
        tracing::info!(tenant_id, expires_at = %session.expires_at, mode = ?session.mode, "payment session created");
        Ok(session)
    }

    /// Expired sessions and sessions that are already finished are reported
    /// as not found.
    pub async fn resolve_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentSession> {
        let not_found = || EngineError::NotFound("payment session".to_string());
        let session = self.store.get_session(token).await?.ok_or_else(not_found)?;
        if session.is_expired(now) || !session.status.is_open() {
            tracing::debug!(status = ?session.status, expires_at = %session.expires_at, "payment session no longer usable");
            return Err(not_found());
        }
        Ok(session)
    }

    pub async fn public_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<PublicSession> {
        let session = self.resolve_session(token, now).await?;
        let tenant = self.store.get_tenant(&session.tenant_id).await?;
        Ok(PublicSession {
            token: session.token,
            tenant_name: tenant.name,
            mode: session.mode,
            amount: session.amount,
            credits_per_unit: session.credits_per_unit,
            rates: session.rates.0,
            description: session.description,
            status: session.status,
            expires_at: session.expires_at,
        })
    }

    /// Claims the session for one payer and starts the top-up at the rate
    /// frozen on the session.
    pub async fn initiate_session_payment(
        &self,
        token: &str,
        req: SessionPayment,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentStarted> {
        let session = self.resolve_session(token, now).await?;
        if session.status != SessionStatus::Pending {
            return Err(EngineError::Conflict(
                "payment session is already being processed".to_string(),
            ));
        }

        let amount = match (session.mode, session.amount, req.amount) {
            (SessionMode::Fixed, Some(fixed), requested) => {
                let fixed_units = fixed.floor_units() as u64;
                if requested.is_some_and(|a| a != fixed_units) {
                    return Err(EngineError::validation(format!(
                        "This payment link is for exactly {fixed_units}"
                    )));
                }
                fixed_units
            }
            (_, _, Some(requested)) if requested >= 1 => requested,
            _ => return Err(EngineError::validation("Amount must be at least 1")),
        };

        // Everything that can reject the payer runs before the claim, so a
        // typo never consumes the link.
        let tenant = self.active_tenant(&session.tenant_id).await?;
        let preflight = self.top_up_preflight(&tenant, amount, &req.phone_number)?;
        let method = self.resolve_payment_method(&tenant, None).await?;

        let Some(claimed) = self
            .store
            .claim_session(token, &preflight.phone, now)
            .await?
        else {
            return Err(EngineError::Conflict(
                "payment session is already being processed".to_string(),
            ));
        };

        let started = self
            .start_top_up(
                TopUp {
                    tenant: &tenant,
                    user_id: None,
                    method,
                    amount,
                    phone: &preflight.phone,
                    tokens_per_unit: claimed.credits_per_unit,
                    session_token: Some(&claimed.token),
                },
                now,
            )
            .await;

        if let Err(start_err) = &started {
            tracing::warn!(error = %start_err, "session payment failed after claim");
            if let Err(err) = self
                .store
                .finish_session(&claimed.token, SessionStatus::Failed, now)
                .await
            {
                tracing::error!(error = %err, "failed to close payment session");
            }
        }
        started
    }
}
