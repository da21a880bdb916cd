//! The HTTP surface: the inbound webhook and the operational REST endpoints
//! (job listing and retry, review claiming and resolution, the manual
//! reconciliation trigger). No auth; the deployment relies on network
//! isolation.

mod error;
mod jobs;
mod reviews;
mod webhook;

pub use error::ApiError;

use models::{IdGenerator, RouteThresholds};
use std::sync::{Arc, Mutex};

pub struct AppState {
    pub pool: sqlx::PgPool,
    pub queue: Arc<dyn kv::JobQueue>,
    pub doc: Arc<dyn saga::DocumentStore>,
    pub thresholds: RouteThresholds,
    pub id_gen: Mutex<IdGenerator>,
}

impl AppState {
    pub fn next_id(&self) -> models::Id {
        self.id_gen.lock().unwrap().next()
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhooks/inbound", post(webhook::inbound))
        .route("/jobs", get(jobs::list))
        .route("/jobs/:id", get(jobs::detail))
        .route("/jobs/:id/retry", post(jobs::retry))
        .route("/api/v1/reviews", get(reviews::list))
        .route("/api/v1/reviews/claim-next", post(reviews::claim_next))
        .route("/api/v1/reviews/:id/resolve", post(reviews::resolve))
        .route(
            "/api/v1/admin/reconciliation/trigger",
            post(admin_trigger_reconciliation),
        )
        .with_state(state)
}

/// Kick a reconciliation run in the background and hand back its report id.
async fn admin_trigger_reconciliation(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Result<axum::Json<serde_json::Value>, ApiError> {
    let report_id = state.next_id();
    let pool = state.pool.clone();
    let doc = state.doc.clone();

    tokio::spawn(async move {
        let config = saga::ReconcileConfig::default();
        if let Err(err) = saga::reconcile(&pool, doc.as_ref(), report_id, &config).await {
            tracing::error!(?err, %report_id, "manually triggered reconciliation failed");
        }
    });

    Ok(axum::Json(serde_json::json!({
        "status": "started",
        "report_id": report_id,
    })))
}
