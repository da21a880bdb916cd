use crate::{agent1, agent2, agent3, confidence, ProcessDeps};
use extract::TokenBudget;
use ingest_sql::jobs::{self, CompletedExtras, JobRow};
use ingest_sql::reviews;
use models::{
    ConsolidatedResult, Id, JobStatus, ProcessingError, ReviewReason, RouteAction,
};
use notify::{FailureNotice, ReviewNotice};
use saga::{DebtRecord, DualWriteRequest};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

/// The queue payload carried per job. The row itself stays authoritative;
/// the message is only a wake-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Id,
}

/// Process one claimed job through the three agents and the router. Stages
/// are serial per job; a worker crash resumes from the first missing
/// checkpoint on the next claim.
#[tracing::instrument(skip(deps), fields(%job_id))]
pub async fn process_job(
    deps: &ProcessDeps,
    job_id: Id,
    worker_token: Uuid,
    visibility: std::time::Duration,
) -> Result<(), ProcessingError> {
    let Some(job) = jobs::claim(&deps.pool, job_id, worker_token, visibility)
        .await
        .map_err(ProcessingError::from)?
    else {
        // The claim can fail because the job settled (drop the message), or
        // because the enqueueing transaction has not committed yet / another
        // worker still holds the claim (retry later).
        return match jobs::fetch(&deps.pool, job_id)
            .await
            .map_err(ProcessingError::from)?
        {
            Some(current)
                if current.processing_status.is_terminal()
                    || current.processing_status == JobStatus::Failed =>
            {
                tracing::info!(status = ?current.processing_status, "job settled, dropping message");
                Ok(())
            }
            Some(current) => {
                tracing::debug!(status = ?current.processing_status, "job not claimable yet");
                Err(ProcessingError::transient("job not claimable yet"))
            }
            None => Err(ProcessingError::transient("job row not visible yet")),
        };
    };

    let budget = TokenBudget::new(deps.settings.token_budget);

    let intent = agent1::run(&deps.extract, &deps.pool, &job, &budget).await?;
    let extraction = agent2::run(
        &deps.extract,
        &deps.pool,
        &job,
        &intent,
        deps.settings.intent_gate,
        &budget,
    )
    .await?;

    // Non-creditor traffic terminates here, with zero vendor calls made.
    if intent.skip_extraction {
        finish(
            deps,
            &job,
            worker_token,
            JobStatus::NotCreditorReply,
            CompletedExtras::default(),
        )
        .await?;
        return Ok(());
    }

    let Some(consolidated) = extraction.result.clone() else {
        // Extraction refused below the intent gate: human review, no write.
        enqueue_review(
            deps,
            &job,
            ReviewReason::LowConfidence,
            serde_json::json!({
                "cause": "intent_below_gate",
                "intent_confidence": intent.confidence,
            }),
        )
        .await?;
        finish(
            deps,
            &job,
            worker_token,
            JobStatus::Completed,
            CompletedExtras {
                confidence_route: Some(RouteAction::ManualReview),
                ..Default::default()
            },
        )
        .await?;
        return Ok(());
    };

    let resolution = agent3::run(
        &deps.pool,
        deps.doc.as_ref(),
        deps.matcher.as_ref(),
        &job,
        &consolidated,
    )
    .await?;

    let match_outcome = resolution
        .match_outcome
        .clone()
        .unwrap_or_else(models::MatchOutcome::no_match);
    let report = confidence::report(&intent, &consolidated, &match_outcome);
    let action = confidence::route(report.overall, &deps.settings.thresholds);
    tracing::info!(
        overall = report.overall,
        weakest = ?report.weakest,
        ?action,
        conflicts = resolution.conflicts.len(),
        "job routed"
    );

    match action {
        RouteAction::ManualReview => {
            let reason = if !resolution.conflicts.is_empty() {
                ReviewReason::ConflictDetected
            } else if !consolidated.invalid_fields.is_empty() {
                ReviewReason::ValidationFailed
            } else {
                ReviewReason::LowConfidence
            };
            enqueue_review(
                deps,
                &job,
                reason,
                serde_json::json!({
                    "confidence": report,
                    "conflicts": resolution.conflicts,
                    "invalid_fields": consolidated.invalid_fields,
                    "final_amount": consolidated.final_amount.to_string(),
                }),
            )
            .await?;
        }
        RouteAction::AutoUpdate | RouteAction::UpdateAndNotify => {
            apply_dual_write(deps, &job, &consolidated, &match_outcome).await?;
            // An invalid adopted field never blocks the write, but it does
            // flag the job for a reviewer's eyes.
            if !consolidated.invalid_fields.is_empty() {
                enqueue_review(
                    deps,
                    &job,
                    ReviewReason::ValidationFailed,
                    serde_json::json!({
                        "invalid_fields": consolidated.invalid_fields,
                        "client_name": consolidated.client_name,
                        "creditor_name": consolidated.creditor_name,
                        "final_amount": consolidated.final_amount.to_string(),
                    }),
                )
                .await?;
            }
            if action == RouteAction::UpdateAndNotify {
                let notice = ReviewNotice {
                    job_id: job.id.to_string(),
                    ticket_id: job.ticket_id.clone(),
                    subject: job.subject.clone(),
                    sender: job.sender.clone(),
                    amount: consolidated.final_amount.to_string(),
                    overall_confidence: report.overall,
                    conflicts: resolution.conflicts.len(),
                };
                if let Err(err) = deps.notifier.notify_review(&notice).await {
                    // Notification transport trouble never fails the job.
                    tracing::warn!(?err, "review notification failed");
                }
            }
        }
    }

    finish(
        deps,
        &job,
        worker_token,
        JobStatus::Completed,
        CompletedExtras {
            error: None,
            extracted_data: Some(
                serde_json::to_value(&consolidated)
                    .map_err(|err| ProcessingError::permanent(err.to_string()))?,
            ),
            match_result: Some(
                serde_json::to_value(&resolution)
                    .map_err(|err| ProcessingError::permanent(err.to_string()))?,
            ),
            extraction_confidence: Some(report.extraction),
            overall_confidence: Some(report.overall),
            confidence_route: Some(action),
        },
    )
    .await?;
    Ok(())
}

/// The write path: dual-write through the saga, then a low-latency delivery
/// attempt. The outbox pump and the reconciler own all further retries.
async fn apply_dual_write(
    deps: &ProcessDeps,
    job: &JobRow,
    consolidated: &ConsolidatedResult,
    match_outcome: &models::MatchOutcome,
) -> Result<(), ProcessingError> {
    let record = DebtRecord {
        ticket_id: job.ticket_id.clone(),
        creditor_identifier: consolidated
            .creditor_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        client_name: consolidated.client_name.clone(),
        amount: consolidated.final_amount.clone(),
    };
    let inquiry_id = match_outcome
        .candidate_id
        .as_deref()
        .and_then(|raw| raw.parse::<Id>().ok());

    // Stable across retries: the provider webhook id identifies the logical
    // operation.
    let request = DualWriteRequest {
        job_id: job.id,
        operation: "update_debt_amount".to_string(),
        idempotency_key: format!("debt-update:{}", job.webhook_id),
        record,
        inquiry_id,
    };
    let outbox_id = deps.next_id();
    saga::dual_write(&deps.pool, outbox_id, &request).await?;

    if let Err(err) =
        saga::process_single(&deps.pool, deps.doc.as_ref(), &request.idempotency_key).await
    {
        // Delivery trouble is the outbox's problem now, not the job's.
        tracing::warn!(?err, "inline outbox delivery failed");
    }
    Ok(())
}

async fn enqueue_review(
    deps: &ProcessDeps,
    job: &JobRow,
    reason: ReviewReason,
    details: serde_json::Value,
) -> Result<(), ProcessingError> {
    let priority = match reason {
        ReviewReason::ConflictDetected => 3,
        _ => 5,
    };
    let review_id = deps.next_id();
    reviews::enqueue(
        &deps.pool,
        review_id,
        job.id,
        reason,
        priority,
        &details,
        Some(chrono::Duration::days(deps.settings.review_expiry_days)),
    )
    .await
    .map_err(ProcessingError::from)?;
    Ok(())
}

async fn finish(
    deps: &ProcessDeps,
    job: &JobRow,
    worker_token: Uuid,
    terminal: JobStatus,
    extras: CompletedExtras,
) -> Result<(), ProcessingError> {
    let done = jobs::complete(&deps.pool, job.id, worker_token, terminal, extras)
        .await
        .map_err(ProcessingError::from)?;
    if !done {
        // The advisory claim lapsed and another worker took over; its run
        // will complete the job through the same checkpoints.
        tracing::warn!(job_id = %job.id, "claim expired before completion");
    }
    Ok(())
}

/// The permanent-failure hook the dispatcher invokes after retries are
/// exhausted or on a non-retryable error: record the terminal state and
/// notify the admin address.
#[tracing::instrument(skip(deps), fields(%job_id))]
pub async fn on_permanent_failure(deps: &ProcessDeps, job_id: Id, error: &str) {
    let job = match jobs::fetch(&deps.pool, job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::error!("permanently failed job not found");
            return;
        }
        Err(err) => {
            tracing::error!(?err, "loading permanently failed job");
            return;
        }
    };

    // Force the terminal transition regardless of who holds the claim.
    let result = sqlx::query(
        r#"
        update incoming_jobs
        set processing_status = 'failed',
            completed_at = now(),
            processing_error = $2,
            worker_token = null,
            claim_expires_at = null
        where id = $1 and processing_status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(&deps.pool)
    .await;
    if let Err(err) = result {
        tracing::error!(?err, "recording permanent failure");
    }

    let notice = FailureNotice {
        job_id: job_id.to_string(),
        ticket_id: job.ticket_id.clone(),
        subject: job.subject.clone(),
        error: error.to_string(),
        retry_count: job.retry_count,
    };
    if let Err(err) = deps.notifier.notify_failure(&notice).await {
        tracing::warn!(?err, "failure notification could not be sent");
    }
}

/// Serde round-trip helper for queue payloads.
pub fn payload_json(job_id: Id) -> serde_json::Value {
    serde_json::json!(JobPayload { job_id })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payload_round_trips() {
        let id = Id::new(42);
        let value = payload_json(id);
        let parsed: JobPayload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.job_id, id);
    }
}
