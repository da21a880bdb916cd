use crate::jobs::parse_id;
use crate::{ApiError, SharedState};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use ingest_sql::{jobs, reviews};
use models::{Id, ReviewReason, ReviewResolution};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ReviewView {
    pub id: Id,
    pub job_id: Id,
    pub reason: ReviewReason,
    pub priority: i16,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ReviewResolution>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<reviews::ReviewRow> for ReviewView {
    fn from(row: reviews::ReviewRow) -> Self {
        ReviewView {
            id: row.id,
            job_id: row.job_id,
            reason: row.reason,
            priority: row.priority,
            details: row.details.map(|d| d.0),
            created_at: row.created_at,
            claimed_at: row.claimed_at,
            claimed_by: row.claimed_by,
            resolved_at: row.resolved_at,
            resolution: row.resolution,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReviewView>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let rows = reviews::list_pending(&state.pool, limit).await?;
    Ok(Json(rows.into_iter().map(ReviewView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub reviewer: String,
}

/// Claim the next pending item with the lock-skipping pattern; losing
/// racers get a 404.
pub async fn claim_next(
    State(state): State<SharedState>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ReviewView>, ApiError> {
    if request.reviewer.trim().is_empty() {
        return Err(ApiError::bad_request("reviewer must not be empty"));
    }
    let claimed = reviews::claim_next(&state.pool, &request.reviewer)
        .await?
        .ok_or_else(|| ApiError::not_found("pending review item"))?;
    Ok(Json(claimed.into()))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: ReviewResolution,
    #[serde(default)]
    pub corrected_data: Option<serde_json::Value>,
}

/// Resolve a claimed item and capture a calibration sample when the
/// resolution carries a usable label.
pub async fn resolve(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ReviewView>, ApiError> {
    let id = parse_id(&id)?;

    if request.resolution == ReviewResolution::Corrected && request.corrected_data.is_none() {
        return Err(ApiError::bad_request(
            "corrected resolution requires corrected_data",
        ));
    }

    let resolved = reviews::resolve(
        &state.pool,
        id,
        request.resolution,
        request.corrected_data.as_ref(),
    )
    .await?
    .ok_or_else(|| ApiError::conflict("review item missing or already resolved"))?;

    if let Some(job) = jobs::fetch(&state.pool, resolved.job_id).await? {
        let sample_id = state.next_id();
        match pipeline::calibration::capture_sample(
            &state.pool,
            sample_id,
            &resolved,
            &job,
            &state.thresholds,
        )
        .await
        {
            Ok(captured) => {
                if captured {
                    tracing::debug!(job_id = %job.id, "calibration sample captured");
                }
            }
            Err(err) => {
                // Sample capture is best-effort; the resolution stands.
                tracing::warn!(?err, job_id = %job.id, "calibration capture failed");
            }
        }
    }

    Ok(Json(resolved.into()))
}
