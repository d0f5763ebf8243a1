use crate::models::PaymentMethod;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<PaymentMethod>, sqlx::Error> {
    sqlx::query_as::<_, PaymentMethod>(
        r#"
        SELECT id, name, kind, shortcode, passkey, consumer_key, consumer_secret,
               environment, is_default, is_active, transaction_count, last_used_at,
               created_at
        FROM payment_methods
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_default(pool: &PgPool) -> Result<Option<PaymentMethod>, sqlx::Error> {
    sqlx::query_as::<_, PaymentMethod>(
        r#"
        SELECT id, name, kind, shortcode, passkey, consumer_key, consumer_secret,
               environment, is_default, is_active, transaction_count, last_used_at,
               created_at
        FROM payment_methods
        WHERE is_default AND is_active
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn record_usage(pool: &PgPool, id: &str, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payment_methods
        SET transaction_count = transaction_count + 1,
            last_used_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
