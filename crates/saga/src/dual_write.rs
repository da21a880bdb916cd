use crate::docstore::DebtRecord;
use crate::sync_status;
use ingest_sql::{idempotency, outbox};
use models::{is_unique_violation, Id, ProcessingError};
use serde_json::json;

/// How long an idempotency record outlives its write.
const IDEMPOTENCY_TTL_HOURS: i64 = 72;

const OUTBOX_MAX_RETRIES: i32 = 5;

#[derive(Debug, Clone)]
pub struct DualWriteRequest {
    pub job_id: Id,
    pub operation: String,
    pub idempotency_key: String,
    pub record: DebtRecord,
    /// The matched inquiry whose relational amount this write updates.
    pub inquiry_id: Option<Id>,
}

/// The dual-write commit: inside one transaction, short-circuit on a known
/// idempotency key, apply the relational portion of the effect, insert the
/// outbox message, and register the idempotency record. The document-store
/// side happens later, in `process_outbox`, never here.
#[tracing::instrument(skip_all, fields(job_id = %request.job_id, idempotency_key = %request.idempotency_key))]
pub async fn dual_write(
    pool: &sqlx::PgPool,
    outbox_id: Id,
    request: &DualWriteRequest,
) -> Result<serde_json::Value, ProcessingError> {
    let mut txn = pool.begin().await.map_err(ProcessingError::from)?;

    if let Some(existing) = idempotency::fetch(&mut *txn, &request.idempotency_key)
        .await
        .map_err(ProcessingError::from)?
    {
        txn.commit().await.map_err(ProcessingError::from)?;
        tracing::debug!("idempotency replay, returning cached result");
        return Ok(existing.result.0);
    }

    // Relational portion of the effect: the matched inquiry's amount, plus
    // the job's sync tracking.
    if let Some(inquiry_id) = request.inquiry_id {
        sqlx::query("update outstanding_inquiries set amount = $2 where id = $1")
            .bind(inquiry_id)
            .bind(&request.record.amount)
            .execute(&mut *txn)
            .await
            .map_err(ProcessingError::from)?;
    }
    sqlx::query("update incoming_jobs set sync_status = $2 where id = $1")
        .bind(request.job_id)
        .bind(sync_status::PENDING)
        .execute(&mut *txn)
        .await
        .map_err(ProcessingError::from)?;

    let payload = serde_json::to_value(&request.record)
        .map_err(|err| ProcessingError::permanent(format!("encoding outbox payload: {err}")))?;

    if let Err(err) = outbox::insert(
        &mut txn,
        outbox_id,
        "incoming_job",
        request.job_id,
        &request.operation,
        &payload,
        &request.idempotency_key,
        OUTBOX_MAX_RETRIES,
    )
    .await
    {
        // A idempotency-key collision across different messages is an
        // integrity error, never auto-resolved.
        if is_unique_violation(&err) {
            return Err(ProcessingError::integrity(format!(
                "outbox idempotency key collision: {}",
                request.idempotency_key
            )));
        }
        return Err(ProcessingError::from(err));
    }

    let result = json!({
        "status": "recorded",
        "outbox_id": outbox_id,
        "job_id": request.job_id,
    });
    idempotency::insert(
        &mut txn,
        &request.idempotency_key,
        &result,
        chrono::Duration::hours(IDEMPOTENCY_TTL_HOURS),
    )
    .await
    .map_err(ProcessingError::from)?;

    txn.commit().await.map_err(ProcessingError::from)?;
    tracing::info!("dual-write recorded");
    Ok(result)
}
