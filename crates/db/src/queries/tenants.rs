//! Tenant reads and the atomic balance primitives.

use crate::models::Tenant;
use notifyhub_core::credits::Credits;
use sqlx::{PgExecutor, PgPool};

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>(
        r#"
        SELECT id, name, balance, sms_rate, email_rate, whatsapp_rate,
               credentials, payment_method_id, status, created_at, updated_at
        FROM tenants
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Conditional decrement. Returns the new balance, or `None` when the
/// balance does not cover `cost` (or the tenant does not exist).
pub async fn debit_if_affordable(
    pool: &PgPool,
    id: &str,
    cost: Credits,
) -> Result<Option<Credits>, sqlx::Error> {
    sqlx::query_scalar::<_, Credits>(
        r#"
        UPDATE tenants
        SET balance = balance - $2,
            updated_at = now()
        WHERE id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(id)
    .bind(cost)
    .fetch_optional(pool)
    .await
}

/// Unconditional atomic delta. Returns the new balance.
pub async fn credit<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
    delta: Credits,
) -> Result<Option<Credits>, sqlx::Error> {
    sqlx::query_scalar::<_, Credits>(
        r#"
        UPDATE tenants
        SET balance = balance + $2,
            updated_at = now()
        WHERE id = $1
        RETURNING balance
        "#,
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(executor)
    .await
}
