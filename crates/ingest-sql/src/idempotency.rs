use chrono::{DateTime, Utc};
use models::TextJson;

#[derive(Debug, sqlx::FromRow)]
pub struct IdempotencyRow {
    pub key: String,
    pub result: TextJson<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Look up a prior application of the keyed operation. Existence means the
/// operation was already applied; callers short-circuit to the stored result.
pub async fn fetch(
    pool: impl sqlx::PgExecutor<'_>,
    key: &str,
) -> sqlx::Result<Option<IdempotencyRow>> {
    sqlx::query_as::<_, IdempotencyRow>(
        "select key, result, created_at, expires_at from idempotency_records where key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

pub async fn insert(
    txn: &mut sqlx::PgConnection,
    key: &str,
    result: &serde_json::Value,
    ttl: chrono::Duration,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into idempotency_records (key, result, expires_at)
        values ($1, $2, now() + make_interval(secs => $3))
        "#,
    )
    .bind(key)
    .bind(TextJson(result))
    .bind(ttl.num_seconds() as f64)
    .execute(txn)
    .await?;
    Ok(())
}

/// Garbage-collect expired records, but only once the outbox message for the
/// same key is delivered or gone: an undelivered outbox row pins its record.
pub async fn delete_expired(pool: impl sqlx::PgExecutor<'_>) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        delete from idempotency_records ir
        where ir.expires_at < now()
          and not exists (
              select 1 from outbox_messages om
              where om.idempotency_key = ir.key
                and om.processed_at is null
          )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(done.rows_affected())
}
