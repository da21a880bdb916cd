use crate::consolidate::consolidate;
use chrono::Utc;
use extract::{extract_body, ExtractContext, TokenBudget};
use ingest_sql::jobs::{self, JobRow};
use models::{
    Agent1Checkpoint, Agent2Checkpoint, CheckpointStatus, ProcessingError, AGENT2_KEY,
};

/// Agent 2: extraction orchestration. Refuses to extract below the intent
/// gate and on skip-listed intents, recording a short-circuit checkpoint
/// either way; otherwise runs the body extractor and one extractor per
/// attachment, then consolidates. Inherits Agent 1's review flag.
#[tracing::instrument(skip_all, fields(job_id = %job.id))]
pub async fn run(
    ctx: &ExtractContext,
    pool: &sqlx::PgPool,
    job: &JobRow,
    intent: &Agent1Checkpoint,
    intent_gate: f64,
    budget: &TokenBudget,
) -> Result<Agent2Checkpoint, ProcessingError> {
    if let Some(existing) = job.agent_checkpoints.0.get(AGENT2_KEY) {
        if let Ok(parsed) = serde_json::from_value::<Agent2Checkpoint>(existing.clone()) {
            tracing::debug!("reusing extraction checkpoint");
            return Ok(parsed);
        }
    }

    let checkpoint = if intent.skip_extraction {
        tracing::info!(intent = ?intent.intent, "extraction short-circuited by intent");
        Agent2Checkpoint {
            status: CheckpointStatus::Passed,
            result: None,
            skipped: true,
            completed_at: Utc::now(),
        }
    } else if intent.confidence < intent_gate {
        tracing::info!(
            confidence = intent.confidence,
            "intent below gate, extraction refused"
        );
        Agent2Checkpoint {
            status: CheckpointStatus::NeedsReview,
            result: None,
            skipped: true,
            completed_at: Utc::now(),
        }
    } else {
        let email = job.inbound_email();
        let mut results = vec![extract_body(&email.body_text)];
        for attachment in &email.attachments {
            results.push(extract::extract_attachment(ctx, job.id, attachment, budget).await);
        }

        let consolidated = consolidate(&results);
        tracing::info!(
            final_amount = %consolidated.final_amount,
            sources = consolidated.sources_processed.len(),
            with_amount = consolidated.sources_with_amount,
            tokens = consolidated.total_tokens,
            "extraction consolidated"
        );

        // Inherit Agent 1's review flag, and raise it ourselves when an
        // adopted field failed validation.
        let status = if intent.status == CheckpointStatus::NeedsReview
            || !consolidated.invalid_fields.is_empty()
        {
            CheckpointStatus::NeedsReview
        } else {
            CheckpointStatus::Passed
        };
        Agent2Checkpoint {
            status,
            result: Some(consolidated),
            skipped: false,
            completed_at: Utc::now(),
        }
    };

    let value = serde_json::to_value(&checkpoint)
        .map_err(|err| ProcessingError::permanent(format!("encoding checkpoint: {err}")))?;
    jobs::record_checkpoint(pool, job.id, AGENT2_KEY, &value)
        .await
        .map_err(ProcessingError::from)?;
    Ok(checkpoint)
}
