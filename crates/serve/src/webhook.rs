use crate::{ApiError, SharedState};
use axum::extract::State;
use axum::Json;
use ingest_sql::jobs;
use models::{is_unique_violation, InboundEmail};
use pipeline::actor::payload_json;
use serde_json::json;

/// The inbound webhook: a returned "accepted" means a durable RECEIVED row
/// exists and the QUEUED enqueue has been made. Duplicate webhook ids
/// short-circuit to the existing job. No extraction happens here.
#[tracing::instrument(skip_all, fields(webhook_id = %payload.webhook_id, ticket_id = %payload.ticket_id))]
pub async fn inbound(
    State(state): State<SharedState>,
    Json(payload): Json<InboundEmail>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.webhook_id.trim().is_empty() {
        return Err(ApiError::bad_request("webhook_id must not be empty"));
    }
    if payload.ticket_id.trim().is_empty() {
        return Err(ApiError::bad_request("ticket_id must not be empty"));
    }
    if payload.from_email.trim().is_empty() {
        return Err(ApiError::bad_request("from_email must not be empty"));
    }

    if let Some(existing) = jobs::fetch_by_webhook_id(&state.pool, &payload.webhook_id).await? {
        return Ok(Json(duplicate_envelope(existing.id)));
    }

    let job_id = state.next_id();
    let mut txn = state.pool.begin().await?;

    if let Err(err) = jobs::create(&mut txn, job_id, &payload).await {
        // A concurrent delivery of the same webhook id won the insert race.
        if is_unique_violation(&err) {
            drop(txn);
            let existing = jobs::fetch_by_webhook_id(&state.pool, &payload.webhook_id)
                .await?
                .ok_or_else(|| ApiError::from(err))?;
            return Ok(Json(duplicate_envelope(existing.id)));
        }
        return Err(err.into());
    }

    jobs::mark_queued(&mut txn, job_id).await?;

    // Enqueue inside the transaction scope: if the queue refuses, the
    // RECEIVED->QUEUED transition rolls back with the insert.
    state
        .queue
        .enqueue(payload_json(job_id))
        .await
        .map_err(|err| {
            tracing::error!(?err, "webhook enqueue failed");
            ApiError::new(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                anyhow::anyhow!("queue unavailable"),
            )
        })?;

    txn.commit().await?;
    tracing::info!(%job_id, "webhook accepted");

    Ok(Json(json!({
        "status": "accepted",
        "job_id": job_id,
    })))
}

fn duplicate_envelope(job_id: models::Id) -> serde_json::Value {
    json!({
        "status": "duplicate",
        "job_id": job_id,
    })
}
