use ingest_sql::inquiries::{self, InquiryRow};
use models::{MatchOutcome, MatchStatus};

/// What the pipeline knows about the parties when asking for a match.
#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    pub ticket_id: String,
    pub case_reference: Option<String>,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
}

/// Resolves an extracted party pair against outstanding inquiries. Scoring
/// must be deterministic for identical inputs.
#[async_trait::async_trait]
pub trait Matcher: Send + Sync {
    async fn resolve(&self, query: &MatchQuery) -> anyhow::Result<MatchOutcome>;
}

/// Deterministic reference matcher over the `outstanding_inquiries` table.
/// Scores case-reference equality and normalized name equality; candidates
/// come from the ticket id first, then the recent-inquiry window.
pub struct InquiryMatcher {
    pool: sqlx::PgPool,
    recency_window_days: i64,
    auto_threshold: f64,
    ambiguity_margin: f64,
}

impl InquiryMatcher {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            recency_window_days: 90,
            auto_threshold: 0.5,
            ambiguity_margin: 0.1,
        }
    }

    fn normalize(value: &str) -> String {
        value.trim().to_lowercase()
    }

    fn score(query: &MatchQuery, candidate: &InquiryRow) -> f64 {
        let mut score: f64 = 0.0;

        if let (Some(query_ref), Some(candidate_ref)) =
            (&query.case_reference, &candidate.case_reference)
        {
            if Self::normalize(query_ref) == Self::normalize(candidate_ref) {
                score += 0.4;
            }
        }
        if let Some(client) = &query.client_name {
            if Self::normalize(client) == Self::normalize(&candidate.client_name) {
                score += 0.4;
            }
        }
        if let Some(creditor) = &query.creditor_name {
            if Self::normalize(creditor) == Self::normalize(&candidate.creditor_name) {
                score += 0.2;
            }
        }
        if candidate.ticket_id == query.ticket_id {
            score += 0.2;
        }
        score.min(1.0)
    }
}

#[async_trait::async_trait]
impl Matcher for InquiryMatcher {
    #[tracing::instrument(skip_all, fields(ticket_id = %query.ticket_id))]
    async fn resolve(&self, query: &MatchQuery) -> anyhow::Result<MatchOutcome> {
        let mut candidates = inquiries::fetch_by_ticket(&self.pool, &query.ticket_id).await?;
        if candidates.is_empty() {
            candidates =
                inquiries::fetch_recent(&self.pool, self.recency_window_days, 200).await?;
            if candidates.is_empty() {
                return Ok(MatchOutcome {
                    score: 0.0,
                    status: MatchStatus::NoRecentInquiry,
                    candidate_id: None,
                });
            }
        }

        let mut scored: Vec<(f64, &InquiryRow)> = candidates
            .iter()
            .map(|candidate| (Self::score(query, candidate), candidate))
            .collect();
        scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let (best_score, best) = scored[0];
        if best_score <= 0.0 {
            return Ok(MatchOutcome::no_match());
        }

        let runner_up = scored.get(1).map(|(score, _)| *score).unwrap_or(0.0);
        let status = if best_score < self.auto_threshold {
            MatchStatus::BelowThreshold
        } else if best_score - runner_up < self.ambiguity_margin && scored.len() > 1 {
            MatchStatus::Ambiguous
        } else {
            MatchStatus::AutoMatched
        };

        Ok(MatchOutcome {
            score: best_score,
            status,
            candidate_id: Some(best.id.to_string()),
        })
    }
}

/// Fixed matcher for tests: always returns the configured outcome.
pub struct FixedMatcher(pub MatchOutcome);

#[async_trait::async_trait]
impl Matcher for FixedMatcher {
    async fn resolve(&self, _query: &MatchQuery) -> anyhow::Result<MatchOutcome> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;

    fn inquiry(ticket: &str, case_ref: Option<&str>, client: &str, creditor: &str) -> InquiryRow {
        InquiryRow {
            id: models::Id::new(1),
            ticket_id: ticket.to_string(),
            case_reference: case_ref.map(str::to_string),
            client_name: client.to_string(),
            creditor_name: creditor.to_string(),
            amount: Some(BigDecimal::from_str("100.00").unwrap()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn scoring_is_deterministic_and_additive() {
        let query = MatchQuery {
            ticket_id: "T-1".to_string(),
            case_reference: Some("AZ-12/34".to_string()),
            client_name: Some("Anna Schäfer".to_string()),
            creditor_name: Some("Inkasso Krüger".to_string()),
        };
        let candidate = inquiry("T-1", Some("az-12/34"), "anna schäfer", "Inkasso Krüger");

        let first = InquiryMatcher::score(&query, &candidate);
        let second = InquiryMatcher::score(&query, &candidate);
        assert_eq!(first, second);
        // 0.4 case ref + 0.4 client + 0.2 creditor + 0.2 ticket, capped.
        assert_eq!(first, 1.0);
    }

    #[test]
    fn partial_matches_score_lower() {
        let query = MatchQuery {
            ticket_id: "T-2".to_string(),
            case_reference: None,
            client_name: Some("Anna Schäfer".to_string()),
            creditor_name: None,
        };
        let candidate = inquiry("T-9", None, "Anna Schäfer", "Someone Else");
        assert!((InquiryMatcher::score(&query, &candidate) - 0.4).abs() < 1e-9);
    }
}
