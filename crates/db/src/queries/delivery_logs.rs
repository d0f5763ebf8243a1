//! Delivery log persistence and the scheduler claim primitives.

use crate::models::{ChannelUsage, DeliveryLog, LogFilter};
use chrono::{DateTime, Utc};
use notifyhub_core::credits::Credits;
use notifyhub_core::types::{LogStatus, RecipientOutcome};
use sqlx::types::Json;
use sqlx::PgPool;

pub async fn insert(pool: &PgPool, log: &DeliveryLog) -> Result<DeliveryLog, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        INSERT INTO delivery_logs
            (id, tenant_id, channel, user_id, recipients, preview, message, subject,
             attachments, cost, network, campaign_id, scheduled_at, status,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
        RETURNING id, tenant_id, channel, user_id, recipients, preview, message, subject,
                  attachments, cost, network, campaign_id, scheduled_at, status,
                  created_at, updated_at
        "#,
    )
    .bind(&log.id)
    .bind(&log.tenant_id)
    .bind(log.channel)
    .bind(&log.user_id)
    .bind(&log.recipients)
    .bind(&log.preview)
    .bind(&log.message)
    .bind(&log.subject)
    .bind(&log.attachments)
    .bind(log.cost)
    .bind(&log.network)
    .bind(&log.campaign_id)
    .bind(log.scheduled_at)
    .bind(log.status)
    .bind(log.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<DeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        SELECT id, tenant_id, channel, user_id, recipients, preview, message, subject,
               attachments, cost, network, campaign_id, scheduled_at, status,
               created_at, updated_at
        FROM delivery_logs
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Claims the oldest due entry. `SKIP LOCKED` lets concurrent workers pass
/// over a row another worker is claiming instead of waiting on it.
pub async fn claim_due(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Option<DeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        UPDATE delivery_logs
        SET status = 'processing',
            updated_at = $1
        WHERE id = (
            SELECT id
            FROM delivery_logs
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND status = 'scheduled'
        RETURNING id, tenant_id, channel, user_id, recipients, preview, message, subject,
                  attachments, cost, network, campaign_id, scheduled_at, status,
                  created_at, updated_at
        "#,
    )
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Claims one specific scheduled entry regardless of its due time.
pub async fn claim_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Option<DeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        UPDATE delivery_logs
        SET status = 'processing',
            updated_at = $3
        WHERE tenant_id = $1 AND id = $2 AND status = 'scheduled'
        RETURNING id, tenant_id, channel, user_id, recipients, preview, message, subject,
                  attachments, cost, network, campaign_id, scheduled_at, status,
                  created_at, updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Writes the final outcome of a processing entry. Returns false if the
/// entry was not in `processing`.
pub async fn finish(
    pool: &PgPool,
    id: &str,
    status: LogStatus,
    recipients: &[RecipientOutcome],
    cost: Credits,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE delivery_logs
        SET status = $2,
            recipients = $3,
            cost = $4,
            updated_at = $5
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(Json(recipients))
    .bind(cost)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_by_tenant(
    pool: &PgPool,
    tenant_id: &str,
    filter: &LogFilter,
) -> Result<Vec<DeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        SELECT id, tenant_id, channel, user_id, recipients, preview, message, subject,
               attachments, cost, network, campaign_id, scheduled_at, status,
               created_at, updated_at
        FROM delivery_logs
        WHERE tenant_id = $1
          AND ($2::channel_kind IS NULL OR channel = $2)
          AND ($3::log_status IS NULL OR status = $3)
        ORDER BY created_at DESC
        LIMIT $4
        "#,
    )
    .bind(tenant_id)
    .bind(filter.channel)
    .bind(filter.status)
    .bind(filter.limit)
    .fetch_all(pool)
    .await
}

pub async fn list_by_campaign(
    pool: &PgPool,
    campaign_id: &str,
) -> Result<Vec<DeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryLog>(
        r#"
        SELECT id, tenant_id, channel, user_id, recipients, preview, message, subject,
               attachments, cost, network, campaign_id, scheduled_at, status,
               created_at, updated_at
        FROM delivery_logs
        WHERE campaign_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}

pub async fn usage_by_channel(
    pool: &PgPool,
    tenant_id: &str,
) -> Result<Vec<ChannelUsage>, sqlx::Error> {
    sqlx::query_as::<_, ChannelUsage>(
        r#"
        SELECT channel,
               COUNT(*) AS messages,
               COUNT(*) FILTER (WHERE status = 'failed') AS failed,
               COALESCE(SUM(cost), 0)::BIGINT AS credits_used
        FROM delivery_logs
        WHERE tenant_id = $1
        GROUP BY channel
        ORDER BY channel
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}
