use crate::{ApiError, SharedState};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use ingest_sql::jobs::{self, JobRow};
use models::{Id, JobStatus, RouteAction};
use pipeline::actor::payload_json;
use serde::{Deserialize, Serialize};

/// The job shape the operational surface exposes.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: Id,
    pub webhook_id: String,
    pub ticket_id: String,
    pub sender: String,
    pub subject: String,
    pub processing_status: JobStatus,
    pub processing_error: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub extraction_confidence: Option<f64>,
    pub overall_confidence: Option<f64>,
    pub confidence_route: Option<RouteAction>,
    pub sync_status: String,
    pub agent_checkpoints: serde_json::Value,
    pub extracted_data: Option<serde_json::Value>,
    pub match_result: Option<serde_json::Value>,
}

impl From<JobRow> for JobView {
    fn from(row: JobRow) -> Self {
        JobView {
            id: row.id,
            webhook_id: row.webhook_id,
            ticket_id: row.ticket_id,
            sender: row.sender,
            subject: row.subject,
            processing_status: row.processing_status,
            processing_error: row.processing_error,
            retry_count: row.retry_count,
            received_at: row.received_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            extraction_confidence: row.extraction_confidence,
            overall_confidence: row.overall_confidence,
            confidence_route: row.confidence_route,
            sync_status: row.sync_status,
            agent_checkpoints: serde_json::to_value(&row.agent_checkpoints.0)
                .unwrap_or(serde_json::Value::Null),
            extracted_data: row.extracted_data.map(|data| data.0),
            match_result: row.match_result.map(|data| data.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let rows = jobs::list_recent(&state.pool, params.status, limit).await?;
    Ok(Json(rows.into_iter().map(JobView::from).collect()))
}

pub async fn detail(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = parse_id(&id)?;
    let row = jobs::fetch(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("job"))?;
    Ok(Json(row.into()))
}

/// Manual retry: only valid in FAILED. The transition and the enqueue
/// commit together.
pub async fn retry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;

    let mut txn = state.pool.begin().await?;
    let transitioned = jobs::manual_retry(&mut txn, id).await?;
    if !transitioned {
        txn.rollback().await?;
        let exists = jobs::fetch(&state.pool, id).await?.is_some();
        return Err(if exists {
            ApiError::conflict("job is not in failed state")
        } else {
            ApiError::not_found("job")
        });
    }

    state.queue.enqueue(payload_json(id)).await.map_err(|err| {
        tracing::error!(?err, "retry enqueue failed");
        ApiError::new(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            anyhow::anyhow!("queue unavailable"),
        )
    })?;
    txn.commit().await?;

    Ok(Json(serde_json::json!({
        "status": "queued",
        "job_id": id,
    })))
}

pub(crate) fn parse_id(raw: &str) -> Result<Id, ApiError> {
    raw.parse::<Id>()
        .map_err(|_| ApiError::bad_request(format!("invalid id '{raw}'")))
}
