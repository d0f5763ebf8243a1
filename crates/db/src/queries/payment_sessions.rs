use crate::models::PaymentSession;
use chrono::{DateTime, Utc};
use notifyhub_core::types::SessionStatus;
use sqlx::{PgExecutor, PgPool};

pub async fn insert(pool: &PgPool, session: &PaymentSession) -> Result<PaymentSession, sqlx::Error> {
    sqlx::query_as::<_, PaymentSession>(
        r#"
        INSERT INTO payment_sessions
            (token, tenant_id, mode, amount, credits_per_unit, rates, description,
             expires_at, status, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING token, tenant_id, mode, amount, credits_per_unit, rates, description,
                  expires_at, status, phone, transaction_id, checkout_request_id,
                  created_by, created_at, updated_at
        "#,
    )
    .bind(&session.token)
    .bind(&session.tenant_id)
    .bind(session.mode)
    .bind(session.amount)
    .bind(session.credits_per_unit)
    .bind(&session.rates)
    .bind(&session.description)
    .bind(session.expires_at)
    .bind(session.status)
    .bind(&session.created_by)
    .bind(session.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<PaymentSession>, sqlx::Error> {
    sqlx::query_as::<_, PaymentSession>(
        r#"
        SELECT token, tenant_id, mode, amount, credits_per_unit, rates, description,
               expires_at, status, phone, transaction_id, checkout_request_id,
               created_by, created_at, updated_at
        FROM payment_sessions
        WHERE token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// `pending -> processing` for an unexpired session. Exactly one payer wins.
pub async fn claim(
    pool: &PgPool,
    token: &str,
    phone: &str,
    now: DateTime<Utc>,
) -> Result<Option<PaymentSession>, sqlx::Error> {
    sqlx::query_as::<_, PaymentSession>(
        r#"
        UPDATE payment_sessions
        SET status = 'processing',
            phone = $2,
            updated_at = $3
        WHERE token = $1 AND status = 'pending' AND expires_at > $3
        RETURNING token, tenant_id, mode, amount, credits_per_unit, rates, description,
                  expires_at, status, phone, transaction_id, checkout_request_id,
                  created_by, created_at, updated_at
        "#,
    )
    .bind(token)
    .bind(phone)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn link_transaction(
    pool: &PgPool,
    token: &str,
    transaction_id: &str,
    checkout_request_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payment_sessions
        SET transaction_id = $2,
            checkout_request_id = COALESCE($3, checkout_request_id),
            updated_at = $4
        WHERE token = $1
        "#,
    )
    .bind(token)
    .bind(transaction_id)
    .bind(checkout_request_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Moves an open session to a terminal status.
pub async fn finish_in<'e, E: PgExecutor<'e>>(
    executor: E,
    token: &str,
    status: SessionStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE payment_sessions
        SET status = $2,
            updated_at = $3
        WHERE token = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(token)
    .bind(status)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}
