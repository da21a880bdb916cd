use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    AutoMatched,
    Ambiguous,
    BelowThreshold,
    NoMatch,
    NoRecentInquiry,
}

/// Outcome of resolving the extracted party pair against outstanding
/// inquiries. `score` is deterministic for identical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub score: f64,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
}

impl MatchOutcome {
    pub fn no_match() -> Self {
        Self {
            score: 0.0,
            status: MatchStatus::NoMatch,
            candidate_id: None,
        }
    }

    /// The match dimension of the confidence aggregate: the raw score,
    /// discounted for ambiguity and zeroed when nothing matched.
    pub fn adjusted_confidence(&self) -> f64 {
        match self.status {
            MatchStatus::Ambiguous => self.score * 0.7,
            MatchStatus::AutoMatched | MatchStatus::BelowThreshold => self.score,
            MatchStatus::NoMatch | MatchStatus::NoRecentInquiry => 0.0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn adjusted_confidence_discounts() {
        let outcome = MatchOutcome {
            score: 0.9,
            status: MatchStatus::Ambiguous,
            candidate_id: Some("inq-1".into()),
        };
        assert!((outcome.adjusted_confidence() - 0.63).abs() < 1e-9);

        let auto = MatchOutcome {
            score: 0.9,
            status: MatchStatus::AutoMatched,
            candidate_id: Some("inq-1".into()),
        };
        assert_eq!(auto.adjusted_confidence(), 0.9);

        assert_eq!(MatchOutcome::no_match().adjusted_confidence(), 0.0);
    }
}
