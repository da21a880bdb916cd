use chrono::{DateTime, Utc};
use models::{Id, ReviewReason, ReviewResolution, TextJson};

#[derive(Debug, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: Id,
    pub job_id: Id,
    pub reason: ReviewReason,
    pub priority: i16,
    pub details: Option<TextJson<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ReviewResolution>,
    pub corrected_data: Option<TextJson<serde_json::Value>>,
    pub expires_at: Option<DateTime<Utc>>,
}

const SELECT_REVIEW: &str = r#"
    select
        id, job_id, reason, priority, details, created_at, claimed_at,
        claimed_by, resolved_at, resolution, corrected_data, expires_at
    from manual_review_items
"#;

/// Enqueue a review item. At most one unresolved item exists per job; a
/// duplicate enqueue returns the existing item instead of inserting.
pub async fn enqueue(
    pool: &sqlx::PgPool,
    id: Id,
    job_id: Id,
    reason: ReviewReason,
    priority: i16,
    details: &serde_json::Value,
    expires_in: Option<chrono::Duration>,
) -> sqlx::Result<ReviewRow> {
    let inserted = sqlx::query_as::<_, ReviewRow>(
        r#"
        insert into manual_review_items
            (id, job_id, reason, priority, details, expires_at)
        values ($1, $2, $3, $4, $5,
                case when $6::float8 is null then null
                     else now() + make_interval(secs => $6) end)
        on conflict (job_id) where resolved_at is null do nothing
        returning
            id, job_id, reason, priority, details, created_at, claimed_at,
            claimed_by, resolved_at, resolution, corrected_data, expires_at
        "#,
    )
    .bind(id)
    .bind(job_id)
    .bind(reason)
    .bind(priority)
    .bind(TextJson(details))
    .bind(expires_in.map(|d| d.num_seconds() as f64))
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        return Ok(row);
    }

    // The partial unique index fired: hand back the unresolved item.
    sqlx::query_as::<_, ReviewRow>(&format!(
        "{SELECT_REVIEW} where job_id = $1 and resolved_at is null"
    ))
    .bind(job_id)
    .fetch_one(pool)
    .await
}

pub async fn fetch(pool: impl sqlx::PgExecutor<'_>, id: Id) -> sqlx::Result<Option<ReviewRow>> {
    sqlx::query_as::<_, ReviewRow>(&format!("{SELECT_REVIEW} where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_pending(
    pool: impl sqlx::PgExecutor<'_>,
    limit: i64,
) -> sqlx::Result<Vec<ReviewRow>> {
    sqlx::query_as::<_, ReviewRow>(&format!(
        r#"{SELECT_REVIEW}
        where resolved_at is null
          and (expires_at is null or expires_at > now())
        order by priority asc, created_at asc
        limit $1"#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Claim the highest-priority unclaimed pending item, skipping rows locked by
/// racing reviewers. Returns `None` to losers.
pub async fn claim_next(
    pool: impl sqlx::PgExecutor<'_>,
    reviewer: &str,
) -> sqlx::Result<Option<ReviewRow>> {
    sqlx::query_as::<_, ReviewRow>(
        r#"
        with picked as (
            select id
            from manual_review_items
            where resolved_at is null
              and claimed_at is null
              and (expires_at is null or expires_at > now())
            order by priority asc, created_at asc
            limit 1
            for update skip locked
        )
        update manual_review_items
        set claimed_at = now(), claimed_by = $1
        where id in (select id from picked)
        returning
            id, job_id, reason, priority, details, created_at, claimed_at,
            claimed_by, resolved_at, resolution, corrected_data, expires_at
        "#,
    )
    .bind(reviewer)
    .fetch_optional(pool)
    .await
}

/// Resolve a claimed item. Returns the resolved row, or `None` if the item
/// was already resolved or does not exist.
pub async fn resolve(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    resolution: ReviewResolution,
    corrected_data: Option<&serde_json::Value>,
) -> sqlx::Result<Option<ReviewRow>> {
    sqlx::query_as::<_, ReviewRow>(
        r#"
        update manual_review_items
        set resolved_at = now(),
            resolution = $2,
            corrected_data = $3
        where id = $1 and resolved_at is null
        returning
            id, job_id, reason, priority, details, created_at, claimed_at,
            claimed_by, resolved_at, resolution, corrected_data, expires_at
        "#,
    )
    .bind(id)
    .bind(resolution)
    .bind(corrected_data.map(TextJson))
    .fetch_optional(pool)
    .await
}
