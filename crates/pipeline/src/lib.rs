//! The three-agent processing pipeline: intent classification, extraction
//! orchestration, consolidation with conflict detection, and the
//! confidence-driven routing that decides between auto-apply, apply-and-
//! notify, and human review. Every stage is checkpointed into the job row
//! and idempotent on retry.

pub mod actor;
pub mod agent1;
pub mod agent2;
pub mod agent3;
pub mod calibration;
pub mod confidence;
pub mod consolidate;
pub mod matcher;

use models::RouteThresholds;
use std::sync::Arc;

/// Tunables of the processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub thresholds: RouteThresholds,
    /// Per-job token budget cap.
    pub token_budget: u64,
    /// Agent 1's acceptance gate; below it, extraction refuses to run.
    pub intent_gate: f64,
    /// Review items created by routing expire after this many days.
    pub review_expiry_days: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            thresholds: RouteThresholds::default(),
            token_budget: extract::TokenBudget::DEFAULT_CAP,
            intent_gate: 0.7,
            review_expiry_days: 7,
        }
    }
}

/// Everything a worker task needs to process one job.
pub struct ProcessDeps {
    pub pool: sqlx::PgPool,
    pub extract: extract::ExtractContext,
    pub matcher: Arc<dyn matcher::Matcher>,
    pub doc: Arc<dyn saga::DocumentStore>,
    pub notifier: Arc<notify::Notifier>,
    pub settings: PipelineSettings,
    pub id_gen: std::sync::Mutex<models::IdGenerator>,
}

impl ProcessDeps {
    pub fn next_id(&self) -> models::Id {
        self.id_gen.lock().unwrap().next()
    }
}
