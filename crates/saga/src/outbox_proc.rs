use crate::docstore::{DebtRecord, DocError, DocumentStore};
use crate::sync_status;
use ingest_sql::{jobs, outbox};
use models::OutboxStatus;
use std::time::Duration;

/// Backoff for outbox redelivery: 30 s doubling per attempt, capped at an
/// hour.
fn retry_delay(retry_count: i32) -> Duration {
    let exp = retry_count.clamp(0, 7) as u32;
    Duration::from_secs((30u64 << exp).min(3600))
}

/// Deliver one claimed outbox message. The idempotency key doubles as the
/// document-store deduplication token, so a redelivery after a crash between
/// write and mark converges to a single effect.
async fn deliver(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    message: &outbox::OutboxRow,
) -> anyhow::Result<bool> {
    let record: DebtRecord = serde_json::from_value(message.payload.0.clone())
        .map_err(|err| anyhow::anyhow!("undecodable outbox payload: {err}"))?;

    match doc.upsert_debt(&record, &message.idempotency_key).await {
        Ok(()) => {
            outbox::mark_processed(pool, message.id).await?;
            jobs::set_sync_status(pool, message.aggregate_id, sync_status::SYNCED).await?;
            tracing::debug!(outbox_id = %message.id, "outbox message delivered");
            Ok(true)
        }
        Err(err) => {
            let delay = retry_delay(message.retry_count);
            let status =
                outbox::record_failure(pool, message.id, &err.to_string(), delay).await?;
            if status == OutboxStatus::Failed {
                jobs::set_sync_status(pool, message.aggregate_id, sync_status::FAILED).await?;
                tracing::warn!(
                    outbox_id = %message.id,
                    error = %err,
                    transient = err.is_transient(),
                    "outbox message exhausted retries and is parked as failed"
                );
            } else {
                tracing::debug!(
                    outbox_id = %message.id,
                    error = %err,
                    ?delay,
                    "outbox delivery failed, will retry"
                );
            }
            Ok(false)
        }
    }
}

/// Claim and deliver a batch of due messages. Returns (delivered, attempted).
#[tracing::instrument(skip(pool, doc))]
pub async fn process_batch(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    batch_size: i64,
    include_failed: bool,
) -> anyhow::Result<(usize, usize)> {
    let batch = outbox::claim_batch(pool, batch_size, include_failed).await?;
    let attempted = batch.len();
    let mut delivered = 0;
    for message in &batch {
        if deliver(pool, doc, message).await? {
            delivered += 1;
        }
    }
    Ok((delivered, attempted))
}

/// Deliver one specific message right after its dual-write commit, for low
/// latency. The message is claimed like any other, so a concurrent pump
/// cannot double-process it; losing the claim is fine.
pub async fn process_single(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    idempotency_key: &str,
) -> anyhow::Result<()> {
    let Some(message) = outbox::fetch_by_key(pool, idempotency_key).await? else {
        return Ok(());
    };
    if message.is_delivered() {
        return Ok(());
    }
    // Re-claim through the batch path to keep the skip-locked discipline.
    let batch = outbox::claim_batch(pool, 1, false).await?;
    for claimed in &batch {
        deliver(pool, doc, claimed).await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        assert_eq!(retry_delay(0), Duration::from_secs(30));
        assert_eq!(retry_delay(1), Duration::from_secs(60));
        assert_eq!(retry_delay(4), Duration::from_secs(480));
        assert_eq!(retry_delay(10), Duration::from_secs(3600));
    }
}
