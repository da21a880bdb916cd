use serde::{Deserialize, Serialize};

/// Lifecycle states of an incoming job. Transitions are strict:
/// `Received → Queued → Processing → (Completed | Failed | NotCreditorReply)`,
/// with the single backward edge `Failed → Queued` for a manual retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Queued,
    Processing,
    Completed,
    Failed,
    NotCreditorReply,
}

impl JobStatus {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Received, Queued)
                | (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, NotCreditorReply)
                | (Failed, Queued)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::NotCreditorReply
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::NotCreditorReply => "not_creditor_reply",
        }
    }
}

/// States of an outbox message. From `Failed`, reconciliation may move a
/// message back to `Pending`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reconciliation_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Running,
    Completed,
    Failed,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(JobStatus::Received.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::NotCreditorReply));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn illegal_transitions() {
        // No skips and no backward edges besides the manual retry.
        assert!(!JobStatus::Received.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::NotCreditorReply.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Queued));
    }
}
