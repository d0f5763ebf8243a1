//! Payment transactions. `pending` is the only mutable state; settlement and
//! failure are conditional on it so a replayed callback finds nothing to do.

use crate::models::Transaction;
use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::types::SessionStatus;
use sqlx::PgPool;

pub async fn insert(pool: &PgPool, txn: &Transaction) -> Result<Transaction, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions
            (id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
             phone, status, description, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
        RETURNING id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
                  phone, status, checkout_request_id, merchant_request_id,
                  settlement_reference, description, metadata, created_at, updated_at
        "#,
    )
    .bind(&txn.id)
    .bind(&txn.tenant_id)
    .bind(&txn.user_id)
    .bind(txn.amount)
    .bind(txn.tokens)
    .bind(&txn.payment_method_id)
    .bind(&txn.session_token)
    .bind(&txn.phone)
    .bind(txn.status)
    .bind(&txn.description)
    .bind(&txn.metadata)
    .bind(txn.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
               phone, status, checkout_request_id, merchant_request_id,
               settlement_reference, description, metadata, created_at, updated_at
        FROM transactions
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_tenant(
    pool: &PgPool,
    tenant_id: &str,
    limit: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
               phone, status, checkout_request_id, merchant_request_id,
               settlement_reference, description, metadata, created_at, updated_at
        FROM transactions
        WHERE tenant_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(tenant_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_by_checkout(
    pool: &PgPool,
    checkout_request_id: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
               phone, status, checkout_request_id, merchant_request_id,
               settlement_reference, description, metadata, created_at, updated_at
        FROM transactions
        WHERE checkout_request_id = $1
        "#,
    )
    .bind(checkout_request_id)
    .fetch_optional(pool)
    .await
}

/// Records the gateway correlation ids on a pending transaction and merges
/// `metadata` into the audit trail.
pub async fn attach_gateway(
    pool: &PgPool,
    id: &str,
    checkout_request_id: &str,
    merchant_request_id: &str,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET checkout_request_id = $2,
            merchant_request_id = $3,
            metadata = metadata || $4::jsonb,
            updated_at = $5
        WHERE id = $1 AND status = 'pending'
        RETURNING id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
                  phone, status, checkout_request_id, merchant_request_id,
                  settlement_reference, description, metadata, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(checkout_request_id)
    .bind(merchant_request_id)
    .bind(metadata)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// `pending -> completed`, tenant credit and linked session completion in
/// one database transaction. Returns `None` if the transaction was no longer
/// pending; nothing is credited in that case.
pub async fn settle(
    pool: &PgPool,
    id: &str,
    settlement_reference: Option<&str>,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Option<(Transaction, Credits)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let settled = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'completed',
            settlement_reference = $2,
            metadata = metadata || $3::jsonb,
            updated_at = $4
        WHERE id = $1 AND status = 'pending'
        RETURNING id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
                  phone, status, checkout_request_id, merchant_request_id,
                  settlement_reference, description, metadata, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(settlement_reference)
    .bind(metadata)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(settled) = settled else {
        tx.rollback().await?;
        return Ok(None);
    };

    let balance = super::tenants::credit(&mut *tx, &settled.tenant_id, settled.tokens)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    if let Some(token) = settled.session_token.as_deref() {
        super::payment_sessions::finish_in(&mut *tx, token, SessionStatus::Completed, now).await?;
    }

    tx.commit().await?;
    Ok(Some((settled, balance)))
}

/// `pending -> failed`, failing the linked session too.
pub async fn fail(
    pool: &PgPool,
    id: &str,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Option<Transaction>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let failed = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'failed',
            metadata = metadata || $2::jsonb,
            updated_at = $3
        WHERE id = $1 AND status = 'pending'
        RETURNING id, tenant_id, user_id, amount, tokens, payment_method_id, session_token,
                  phone, status, checkout_request_id, merchant_request_id,
                  settlement_reference, description, metadata, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(metadata)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(token) = failed.as_ref().and_then(|t| t.session_token.as_deref()) {
        super::payment_sessions::finish_in(&mut *tx, token, SessionStatus::Failed, now).await?;
    }

    tx.commit().await?;
    Ok(failed)
}
