//! Campaign persistence. Every status change is a conditional update on
//! the expected current status.

use crate::models::Campaign;
use chrono::{DateTime, Utc};
use notifyhub_core::types::{CampaignAnalytics, CampaignStatus};
use sqlx::types::Json;
use sqlx::PgPool;

pub async fn insert(pool: &PgPool, campaign: &Campaign) -> Result<Campaign, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        INSERT INTO campaigns
            (id, tenant_id, created_by, name, channels, messages, recipient_policy,
             selected_contacts, group_id, scheduled_at, status, analytics,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
        RETURNING id, tenant_id, created_by, name, channels, messages, recipient_policy,
                  selected_contacts, group_id, scheduled_at, status, analytics,
                  launched_at, completed_at, created_at, updated_at
        "#,
    )
    .bind(&campaign.id)
    .bind(&campaign.tenant_id)
    .bind(&campaign.created_by)
    .bind(&campaign.name)
    .bind(&campaign.channels)
    .bind(&campaign.messages)
    .bind(campaign.recipient_policy)
    .bind(&campaign.selected_contacts)
    .bind(&campaign.group_id)
    .bind(campaign.scheduled_at)
    .bind(campaign.status)
    .bind(&campaign.analytics)
    .bind(campaign.created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        SELECT id, tenant_id, created_by, name, channels, messages, recipient_policy,
               selected_contacts, group_id, scheduled_at, status, analytics,
               launched_at, completed_at, created_at, updated_at
        FROM campaigns
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_tenant(pool: &PgPool, tenant_id: &str) -> Result<Vec<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        SELECT id, tenant_id, created_by, name, channels, messages, recipient_policy,
               selected_contacts, group_id, scheduled_at, status, analytics,
               launched_at, completed_at, created_at, updated_at
        FROM campaigns
        WHERE tenant_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

/// Moves `id` from `from` to `to`. Entering `active` stamps `launched_at`,
/// entering `completed` stamps `completed_at`.
pub async fn transition(
    pool: &PgPool,
    id: &str,
    from: CampaignStatus,
    to: CampaignStatus,
    now: DateTime<Utc>,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        UPDATE campaigns
        SET status = $3,
            launched_at = CASE WHEN $3 = 'active'::campaign_status THEN $4 ELSE launched_at END,
            completed_at = CASE WHEN $3 = 'completed'::campaign_status THEN $4 ELSE completed_at END,
            updated_at = $4
        WHERE id = $1 AND status = $2
        RETURNING id, tenant_id, created_by, name, channels, messages, recipient_policy,
                  selected_contacts, group_id, scheduled_at, status, analytics,
                  launched_at, completed_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn cancel(
    pool: &PgPool,
    tenant_id: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        UPDATE campaigns
        SET status = 'canceled',
            updated_at = $3
        WHERE tenant_id = $1 AND id = $2
          AND status IN ('draft', 'scheduled', 'active')
        RETURNING id, tenant_id, created_by, name, channels, messages, recipient_policy,
                  selected_contacts, group_id, scheduled_at, status, analytics,
                  launched_at, completed_at, created_at, updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Promotes the oldest due scheduled campaign to `active`.
pub async fn claim_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        r#"
        UPDATE campaigns
        SET status = 'active',
            launched_at = $1,
            updated_at = $1
        WHERE id = (
            SELECT id
            FROM campaigns
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND status = 'scheduled'
        RETURNING id, tenant_id, created_by, name, channels, messages, recipient_policy,
                  selected_contacts, group_id, scheduled_at, status, analytics,
                  launched_at, completed_at, created_at, updated_at
        "#,
    )
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn update_analytics(
    pool: &PgPool,
    id: &str,
    analytics: CampaignAnalytics,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE campaigns
        SET analytics = $2,
            updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(Json(analytics))
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
