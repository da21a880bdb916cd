use crate::docstore::{DebtRecord, DocumentStore};
use ingest_sql::reconciliation::{self, ReportTallies};
use ingest_sql::{idempotency, jobs, outbox};
use models::{ConsolidatedResult, Id, ReconciliationStatus};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Window for outbox retries and the drift comparison.
    pub window_hours: i64,
    /// Delivered outbox messages older than this are deleted.
    pub outbox_retain_days: i64,
    pub batch_size: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            window_hours: 48,
            outbox_retain_days: 30,
            batch_size: 100,
        }
    }
}

/// One reconciliation run:
/// (i) retry every undelivered outbox message in the window, failed ones
///     included; (ii) compare the relational record against the document
///     store for recently written jobs and re-apply from the relational
///     side on drift; (iii) clean up expired idempotency records and old
///     delivered outbox rows; (iv) write an immutable report.
///
/// When the document store is unavailable only step (ii) is skipped.
#[tracing::instrument(skip(pool, doc), fields(report_id = %report_id))]
pub async fn reconcile(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    report_id: Id,
    config: &ReconcileConfig,
) -> anyhow::Result<ReportTallies> {
    reconciliation::open_report(pool, report_id).await?;

    let outcome = run_steps(pool, doc, report_id, config).await;
    match outcome {
        Ok((tallies, details)) => {
            reconciliation::complete_report(
                pool,
                report_id,
                ReconciliationStatus::Completed,
                &tallies,
                &details,
                None,
            )
            .await?;
            Ok(tallies)
        }
        Err(err) => {
            let tallies = ReportTallies::default();
            reconciliation::complete_report(
                pool,
                report_id,
                ReconciliationStatus::Failed,
                &tallies,
                &json!({}),
                Some(&format!("{err:#}")),
            )
            .await?;
            Err(err)
        }
    }
}

async fn run_steps(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    report_id: Id,
    config: &ReconcileConfig,
) -> anyhow::Result<(ReportTallies, serde_json::Value)> {
    let mut tallies = ReportTallies::default();

    // (i) Outbox retries. Failed messages re-enter the pending pool first.
    let requeued = outbox::requeue_failed(pool, config.window_hours).await?;
    let mut delivered_total = 0usize;
    loop {
        let (delivered, attempted) =
            crate::process_batch(pool, doc, config.batch_size, true).await?;
        delivered_total += delivered;
        tallies.records_checked += attempted as i32;
        if attempted < config.batch_size as usize {
            break;
        }
    }

    // Whatever is still undelivered and exhausted counts as a failed repair.
    let undelivered = outbox::list_undelivered(pool, config.window_hours).await?;
    let exhausted = undelivered.iter().filter(|m| m.is_exhausted()).count();
    tallies.failed_repairs += exhausted as i32;

    // (ii) Drift comparison, relational side authoritative.
    let doc_available = doc.health().await;
    if doc_available {
        let written = jobs::list_recently_written(pool, config.window_hours).await?;
        for job in &written {
            tallies.records_checked += 1;
            let Some(expected) = expected_record(job) else {
                continue;
            };
            let stored = match doc.fetch_by_ticket(&job.ticket_id).await {
                Ok(stored) => stored,
                Err(err) => {
                    tracing::warn!(job_id = %job.id, %err, "drift lookup failed");
                    tallies.failed_repairs += 1;
                    continue;
                }
            };

            let drifted = match &stored {
                Some(record) => record.amount != expected.amount,
                None => true,
            };
            if !drifted {
                continue;
            }
            tallies.mismatches_found += 1;

            let repair_key = format!("reconcile-{report_id}-{}", job.id);
            match doc.upsert_debt(&expected, &repair_key).await {
                Ok(()) => {
                    jobs::set_sync_status(pool, job.id, crate::sync_status::SYNCED).await?;
                    tallies.auto_repaired += 1;
                }
                Err(err) => {
                    tracing::warn!(job_id = %job.id, %err, "drift repair failed");
                    tallies.failed_repairs += 1;
                }
            }
        }
    } else {
        tracing::warn!("document store unavailable, skipping drift comparison");
    }

    // (iii) Cleanup. Expired idempotency records only go once their outbox
    // message is settled; delivered outbox rows age out.
    let gc_idempotency = idempotency::delete_expired(pool).await?;
    let gc_outbox = outbox::delete_processed_before(pool, config.outbox_retain_days).await?;

    let details = json!({
        "requeued_failed": requeued,
        "outbox_delivered": delivered_total,
        "outbox_exhausted": exhausted,
        "doc_available": doc_available,
        "gc_idempotency_records": gc_idempotency,
        "gc_outbox_messages": gc_outbox,
    });
    Ok((tallies, details))
}

/// The authoritative record a completed job should have produced, from its
/// persisted consolidated result.
fn expected_record(job: &jobs::JobRow) -> Option<DebtRecord> {
    let extracted: ConsolidatedResult =
        serde_json::from_value(job.extracted_data.as_ref()?.0.clone()).ok()?;
    Some(DebtRecord {
        ticket_id: job.ticket_id.clone(),
        creditor_identifier: extracted
            .creditor_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        client_name: extracted.client_name.clone(),
        amount: extracted.final_amount,
    })
}
