use crate::extraction::ConsolidatedResult;
use crate::matching::MatchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classified intent of an inbound message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DebtStatement,
    PaymentPlan,
    Rejection,
    Inquiry,
    AutoReply,
    Spam,
}

impl Intent {
    /// Non-creditor intents short-circuit extraction entirely.
    pub fn skips_extraction(&self) -> bool {
        matches!(self, Intent::AutoReply | Intent::Spam)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DebtStatement => "debt_statement",
            Intent::PaymentPlan => "payment_plan",
            Intent::Rejection => "rejection",
            Intent::Inquiry => "inquiry",
            Intent::AutoReply => "auto_reply",
            Intent::Spam => "spam",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Passed,
    NeedsReview,
}

/// Agent 1: intent classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent1Checkpoint {
    pub status: CheckpointStatus,
    pub intent: Intent,
    pub confidence: f64,
    /// True when the rule-based fast path decided, with zero token cost.
    #[serde(default)]
    pub rule_based: bool,
    #[serde(default)]
    pub skip_extraction: bool,
    #[serde(default)]
    pub tokens_used: u64,
    pub completed_at: DateTime<Utc>,
}

/// Agent 2: extraction orchestration over body and attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent2Checkpoint {
    pub status: CheckpointStatus,
    /// Present unless the stage was short-circuited by Agent 1.
    pub result: Option<ConsolidatedResult>,
    #[serde(default)]
    pub skipped: bool,
    pub completed_at: DateTime<Utc>,
}

/// A detected mismatch between the extracted record and the stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub stored: String,
    pub extracted: String,
}

/// Agent 3: match resolution and conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent3Checkpoint {
    pub status: CheckpointStatus,
    pub match_outcome: Option<MatchOutcome>,
    #[serde(default)]
    pub conflicts: Vec<FieldConflict>,
    /// Where the existing DOC record was found, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_lookup: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// The per-job checkpoint map persisted inside the job row, keyed by agent
/// name. Values are kept as raw JSON so that readers tolerate unknown fields
/// written by newer versions.
pub type AgentCheckpoints = BTreeMap<String, serde_json::Value>;

pub const AGENT1_KEY: &str = "intent";
pub const AGENT2_KEY: &str = "extraction";
pub const AGENT3_KEY: &str = "consolidation";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skip_extraction_intents() {
        assert!(Intent::AutoReply.skips_extraction());
        assert!(Intent::Spam.skips_extraction());
        assert!(!Intent::DebtStatement.skips_extraction());
        assert!(!Intent::Rejection.skips_extraction());
    }

    #[test]
    fn checkpoint_tolerates_unknown_fields() {
        let raw = serde_json::json!({
            "status": "passed",
            "intent": "debt_statement",
            "confidence": 0.91,
            "rule_based": false,
            "skip_extraction": false,
            "completed_at": "2025-03-01T10:00:00Z",
            "some_future_field": {"nested": true},
        });
        let cp: Agent1Checkpoint = serde_json::from_value(raw).unwrap();
        assert_eq!(cp.intent, Intent::DebtStatement);
        assert_eq!(cp.status, CheckpointStatus::Passed);
    }
}
