use chrono::{DateTime, Utc};
use models::{
    AgentCheckpoints, AttachmentDescriptor, Id, InboundEmail, JobStatus, RouteAction, TextJson,
};
use sqlx::types::Uuid;
use std::collections::BTreeMap;

/// A full row of `incoming_jobs`.
#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub id: Id,
    pub webhook_id: String,
    pub ticket_id: String,
    pub sender: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub headers: TextJson<BTreeMap<String, String>>,
    pub attachments: TextJson<Vec<AttachmentDescriptor>>,
    pub received_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub processing_status: JobStatus,
    pub processing_error: Option<String>,
    pub worker_token: Option<Uuid>,
    pub claim_expires_at: Option<DateTime<Utc>>,
    pub extracted_data: Option<TextJson<serde_json::Value>>,
    pub match_result: Option<TextJson<serde_json::Value>>,
    pub agent_checkpoints: TextJson<AgentCheckpoints>,
    pub extraction_confidence: Option<f64>,
    pub overall_confidence: Option<f64>,
    pub confidence_route: Option<RouteAction>,
    pub sync_status: String,
}

impl JobRow {
    /// Reassemble the inbound email from the persisted columns.
    pub fn inbound_email(&self) -> InboundEmail {
        InboundEmail {
            ticket_id: self.ticket_id.clone(),
            webhook_id: self.webhook_id.clone(),
            from_email: self.sender.clone(),
            subject: self.subject.clone(),
            body_text: self.body_text.clone(),
            body_html: self.body_html.clone(),
            headers: self.headers.0.clone(),
            attachments: self.attachments.0.clone(),
        }
    }
}

const SELECT_JOB: &str = r#"
    select
        id, webhook_id, ticket_id, sender, subject, body_text, body_html,
        headers, attachments, received_at, started_at, completed_at,
        retry_count, processing_status, processing_error, worker_token,
        claim_expires_at, extracted_data, match_result, agent_checkpoints,
        extraction_confidence, overall_confidence, confidence_route,
        sync_status
    from incoming_jobs
"#;

/// Insert a new job in `received` state. Fails with a unique violation when
/// the webhook id was already seen; callers treat that as a duplicate.
pub async fn create(
    txn: &mut sqlx::PgConnection,
    id: Id,
    email: &InboundEmail,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into incoming_jobs
            (id, webhook_id, ticket_id, sender, subject, body_text, body_html,
             headers, attachments, processing_status)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'received')
        "#,
    )
    .bind(id)
    .bind(&email.webhook_id)
    .bind(&email.ticket_id)
    .bind(&email.from_email)
    .bind(&email.subject)
    .bind(&email.body_text)
    .bind(&email.body_html)
    .bind(TextJson(&email.headers))
    .bind(TextJson(&email.attachments))
    .execute(txn)
    .await?;
    Ok(())
}

pub async fn fetch(pool: impl sqlx::PgExecutor<'_>, id: Id) -> sqlx::Result<Option<JobRow>> {
    sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_by_webhook_id(
    pool: impl sqlx::PgExecutor<'_>,
    webhook_id: &str,
) -> sqlx::Result<Option<JobRow>> {
    sqlx::query_as::<_, JobRow>(&format!("{SELECT_JOB} where webhook_id = $1"))
        .bind(webhook_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_recent(
    pool: impl sqlx::PgExecutor<'_>,
    status: Option<JobStatus>,
    limit: i64,
) -> sqlx::Result<Vec<JobRow>> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"{SELECT_JOB}
        where ($1::job_status is null or processing_status = $1)
        order by received_at desc
        limit $2"#
    ))
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Transition `received -> queued`. Returns false when the job was not in
/// `received` (e.g. a concurrent duplicate delivery already queued it).
pub async fn mark_queued(txn: &mut sqlx::PgConnection, id: Id) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"
        update incoming_jobs
        set processing_status = 'queued'
        where id = $1 and processing_status = 'received'
        "#,
    )
    .bind(id)
    .execute(txn)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Claim a queued job for processing using the lock-skipping row claim.
/// A `processing` row is only re-claimable once its advisory claim expired.
/// Returns `None` when the job is already held or completed.
pub async fn claim(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    worker_token: Uuid,
    visibility: std::time::Duration,
) -> sqlx::Result<Option<JobRow>> {
    sqlx::query_as::<_, JobRow>(
        r#"
        with picked as (
            select id
            from incoming_jobs
            where id = $1
              and (processing_status = 'queued'
                   or (processing_status = 'processing' and claim_expires_at < now()))
            for update skip locked
        )
        update incoming_jobs
        set processing_status = 'processing',
            started_at = coalesce(started_at, now()),
            worker_token = $2,
            claim_expires_at = now() + $3::interval
        where id in (select id from picked)
        returning
            id, webhook_id, ticket_id, sender, subject, body_text, body_html,
            headers, attachments, received_at, started_at, completed_at,
            retry_count, processing_status, processing_error, worker_token,
            claim_expires_at, extracted_data, match_result, agent_checkpoints,
            extraction_confidence, overall_confidence, confidence_route,
            sync_status
        "#,
    )
    .bind(id)
    .bind(worker_token)
    .bind(format!("{} seconds", visibility.as_secs()))
    .fetch_optional(pool)
    .await
}

/// Extend the advisory claim of a held job (heartbeat).
pub async fn extend_claim(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    worker_token: Uuid,
    visibility: std::time::Duration,
) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"
        update incoming_jobs
        set claim_expires_at = now() + $3::interval
        where id = $1 and worker_token = $2 and processing_status = 'processing'
        "#,
    )
    .bind(id)
    .bind(worker_token)
    .bind(format!("{} seconds", visibility.as_secs()))
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Structured extras recorded with a terminal transition.
#[derive(Debug, Default)]
pub struct CompletedExtras {
    pub error: Option<String>,
    pub extracted_data: Option<serde_json::Value>,
    pub match_result: Option<serde_json::Value>,
    pub extraction_confidence: Option<f64>,
    pub overall_confidence: Option<f64>,
    pub confidence_route: Option<RouteAction>,
}

/// Transition `processing -> terminal`, guarded by the worker token so that
/// an expired claim cannot complete a job that was re-claimed elsewhere.
pub async fn complete(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    worker_token: Uuid,
    terminal: JobStatus,
    extras: CompletedExtras,
) -> sqlx::Result<bool> {
    assert!(
        matches!(
            terminal,
            JobStatus::Completed | JobStatus::Failed | JobStatus::NotCreditorReply
        ),
        "complete() requires a terminal status, got {terminal:?}"
    );

    let done = sqlx::query(
        r#"
        update incoming_jobs
        set processing_status = $3,
            completed_at = now(),
            processing_error = $4,
            extracted_data = coalesce($5, extracted_data),
            match_result = coalesce($6, match_result),
            extraction_confidence = coalesce($7, extraction_confidence),
            overall_confidence = coalesce($8, overall_confidence),
            confidence_route = coalesce($9, confidence_route),
            worker_token = null,
            claim_expires_at = null
        where id = $1 and worker_token = $2 and processing_status = 'processing'
        "#,
    )
    .bind(id)
    .bind(worker_token)
    .bind(terminal)
    .bind(extras.error)
    .bind(extras.extracted_data.map(TextJson))
    .bind(extras.match_result.map(TextJson))
    .bind(extras.extraction_confidence)
    .bind(extras.overall_confidence)
    .bind(extras.confidence_route)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Release a held job for a later retry attempt: the advisory claim lapses
/// immediately and the retry counter advances. The row stays `processing`
/// until re-claimed, so observers can see the in-flight error.
pub async fn release_for_retry(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    worker_token: Uuid,
    error: &str,
) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"
        update incoming_jobs
        set claim_expires_at = now(),
            retry_count = retry_count + 1,
            processing_error = $3
        where id = $1 and worker_token = $2 and processing_status = 'processing'
        "#,
    )
    .bind(id)
    .bind(worker_token)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Manual retry of a failed job: `failed -> queued`, clearing the error and
/// advancing the retry counter. The only legal backward edge.
pub async fn manual_retry(txn: &mut sqlx::PgConnection, id: Id) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"
        update incoming_jobs
        set processing_status = 'queued',
            processing_error = null,
            retry_count = retry_count + 1,
            worker_token = null,
            claim_expires_at = null
        where id = $1 and processing_status = 'failed'
        "#,
    )
    .bind(id)
    .execute(txn)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Durably record an agent checkpoint under the given key.
pub async fn record_checkpoint(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    key: &str,
    checkpoint: &serde_json::Value,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update incoming_jobs
        set agent_checkpoints =
            jsonb_set(agent_checkpoints::jsonb, array[$2], $3::jsonb, true)::json
        where id = $1
        "#,
    )
    .bind(id)
    .bind(key)
    .bind(TextJson(checkpoint))
    .execute(pool)
    .await?;
    Ok(())
}

/// Update the saga's dual-write tracking column.
pub async fn set_sync_status(
    pool: impl sqlx::PgExecutor<'_>,
    id: Id,
    sync_status: &str,
) -> sqlx::Result<()> {
    sqlx::query("update incoming_jobs set sync_status = $2 where id = $1")
        .bind(id)
        .bind(sync_status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Jobs written in the reconciliation window whose DOC effect may need a
/// drift check: completed with a write route, in the last `window_hours`.
pub async fn list_recently_written(
    pool: impl sqlx::PgExecutor<'_>,
    window_hours: i64,
) -> sqlx::Result<Vec<JobRow>> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"{SELECT_JOB}
        where processing_status = 'completed'
          and confidence_route in ('auto_update', 'update_and_notify')
          and received_at > now() - make_interval(hours => $1)
        order by received_at asc"#
    ))
    .bind(window_hours)
    .fetch_all(pool)
    .await
}
