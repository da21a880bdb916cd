use chrono::{DateTime, Utc};
use models::{Id, OutboxStatus, TextJson};

/// A durable record of a pending document-store effect.
#[derive(Debug, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: Id,
    pub aggregate_type: String,
    pub aggregate_id: Id,
    pub operation: String,
    pub payload: TextJson<serde_json::Value>,
    pub idempotency_key: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
}

impl OutboxRow {
    /// A message is delivered iff `processed_at` is set.
    pub fn is_delivered(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

const SELECT_OUTBOX: &str = r#"
    select
        id, aggregate_type, aggregate_id, operation, payload,
        idempotency_key, status, created_at, processed_at, next_attempt_at,
        retry_count, max_retries, last_error
    from outbox_messages
"#;

/// Insert a new outbox message inside the dual-write transaction. A reused
/// idempotency key fails the unique constraint, which the saga treats as an
/// integrity error.
pub async fn insert(
    txn: &mut sqlx::PgConnection,
    id: Id,
    aggregate_type: &str,
    aggregate_id: Id,
    operation: &str,
    payload: &serde_json::Value,
    idempotency_key: &str,
    max_retries: i32,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into outbox_messages
            (id, aggregate_type, aggregate_id, operation, payload,
             idempotency_key, status, max_retries)
        values ($1, $2, $3, $4, $5, $6, 'pending', $7)
        "#,
    )
    .bind(id)
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(operation)
    .bind(TextJson(payload))
    .bind(idempotency_key)
    .bind(max_retries)
    .execute(txn)
    .await?;
    Ok(())
}

pub async fn fetch_by_key(
    pool: impl sqlx::PgExecutor<'_>,
    idempotency_key: &str,
) -> sqlx::Result<Option<OutboxRow>> {
    sqlx::query_as::<_, OutboxRow>(&format!("{SELECT_OUTBOX} where idempotency_key = $1"))
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await
}

/// Claim a batch of due, undelivered messages with the lock-skipping pattern.
/// Claimed rows are flipped to `processing`; no message is handed to two
/// workers at once.
pub async fn claim_batch(
    pool: impl sqlx::PgExecutor<'_>,
    limit: i64,
    include_failed: bool,
) -> sqlx::Result<Vec<OutboxRow>> {
    sqlx::query_as::<_, OutboxRow>(
        r#"
        with picked as (
            select id
            from outbox_messages
            where processed_at is null
              and next_attempt_at <= now()
              and (status in ('pending', 'processing')
                   or ($2 and status = 'failed'))
            order by created_at asc
            limit $1
            for update skip locked
        )
        update outbox_messages
        set status = 'processing'
        where id in (select id from picked)
        returning
            id, aggregate_type, aggregate_id, operation, payload,
            idempotency_key, status, created_at, processed_at, next_attempt_at,
            retry_count, max_retries, last_error
        "#,
    )
    .bind(limit)
    .bind(include_failed)
    .fetch_all(pool)
    .await
}

/// Mark a message delivered. Idempotent: a message already delivered is left
/// untouched.
pub async fn mark_processed(pool: impl sqlx::PgExecutor<'_>, id: Id) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update outbox_messages
        set status = 'processed', processed_at = now()
        where id = $1 and processed_at is null
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a delivery failure. Advances the retry counter only while the
/// message is undelivered; once retries are exhausted the message parks in
/// `failed` for reconciliation.
pub async fn record_failure(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    error: &str,
    next_attempt_in: std::time::Duration,
) -> sqlx::Result<OutboxStatus> {
    let row: (OutboxStatus,) = sqlx::query_as(
        r#"
        update outbox_messages
        set retry_count = retry_count + 1,
            last_error = $2,
            next_attempt_at = now() + $3::interval,
            status = case
                when retry_count + 1 >= max_retries then 'failed'::outbox_status
                else 'pending'::outbox_status
            end
        where id = $1 and processed_at is null
        returning status
        "#,
    )
    .bind(id)
    .bind(error)
    .bind(format!("{} seconds", next_attempt_in.as_secs()))
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Reconciliation moves exhausted messages back to `pending` for another
/// delivery round.
pub async fn requeue_failed(
    pool: impl sqlx::PgExecutor<'_>,
    window_hours: i64,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        update outbox_messages
        set status = 'pending', next_attempt_at = now()
        where status = 'failed'
          and processed_at is null
          and created_at > now() - make_interval(hours => $1)
        "#,
    )
    .bind(window_hours)
    .execute(pool)
    .await?;
    Ok(done.rows_affected())
}

/// Messages still undelivered past the convergence deadline; surfaced by the
/// reconciliation report as failed repairs when exhausted.
pub async fn list_undelivered(
    pool: impl sqlx::PgExecutor<'_>,
    window_hours: i64,
) -> sqlx::Result<Vec<OutboxRow>> {
    sqlx::query_as::<_, OutboxRow>(&format!(
        r#"{SELECT_OUTBOX}
        where processed_at is null
          and created_at > now() - make_interval(hours => $1)
        order by created_at asc"#
    ))
    .bind(window_hours)
    .fetch_all(pool)
    .await
}

/// Delete messages delivered more than `retain_days` ago.
pub async fn delete_processed_before(
    pool: impl sqlx::PgExecutor<'_>,
    retain_days: i64,
) -> sqlx::Result<u64> {
    let done = sqlx::query(
        r#"
        delete from outbox_messages
        where processed_at is not null
          and processed_at < now() - make_interval(days => $1)
        "#,
    )
    .bind(retain_days)
    .execute(pool)
    .await?;
    Ok(done.rows_affected())
}
