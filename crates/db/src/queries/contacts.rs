//! Read-only access to the tenant contact directory.

use crate::models::Contact;
use sqlx::PgPool;

pub async fn list_by_tenant(pool: &PgPool, tenant_id: &str) -> Result<Vec<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, tenant_id, name, phone, email, group_ids, created_at
        FROM contacts
        WHERE tenant_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

pub async fn list_by_ids(
    pool: &PgPool,
    tenant_id: &str,
    ids: &[String],
) -> Result<Vec<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, tenant_id, name, phone, email, group_ids, created_at
        FROM contacts
        WHERE tenant_id = $1 AND id = ANY($2)
        ORDER BY created_at
        "#,
    )
    .bind(tenant_id)
    .bind(ids)
    .fetch_all(pool)
    .await
}

pub async fn list_by_group(
    pool: &PgPool,
    tenant_id: &str,
    group_id: &str,
) -> Result<Vec<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, tenant_id, name, phone, email, group_ids, created_at
        FROM contacts
        WHERE tenant_id = $1 AND $2 = ANY(group_ids)
        ORDER BY created_at
        "#,
    )
    .bind(tenant_id)
    .bind(group_id)
    .fetch_all(pool)
    .await
}
