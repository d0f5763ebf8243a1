//! API key lookup for request authentication.

use crate::models::ApiKey;
use sqlx::PgPool;

/// Active key by SHA-256 hash. Keys whose tenant row is gone never resolve.
pub async fn get_by_hash(pool: &PgPool, key_hash: &str) -> Result<Option<ApiKey>, sqlx::Error> {
    sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT k.id, k.key_hash, k.key_prefix, k.tenant_id, k.user_id, k.role,
               k.name, k.status, k.last_used_at, k.created_at
        FROM api_keys k
        JOIN tenants t ON t.id = k.tenant_id
        WHERE k.key_hash = $1 AND k.status = 'active'
        "#,
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await
}

/// Best effort; a lost update only delays `last_used_at`.
pub async fn touch_last_used(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1 AND status = 'active'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
