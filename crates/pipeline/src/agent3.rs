use crate::matcher::{MatchQuery, Matcher};
use bigdecimal::BigDecimal;
use chrono::Utc;
use ingest_sql::jobs::{self, JobRow};
use localize::extract_case_reference;
use models::{
    Agent3Checkpoint, CheckpointStatus, ConsolidatedResult, FieldConflict, ProcessingError,
    AGENT3_KEY,
};
use saga::{DebtRecord, DocumentStore};
use std::str::FromStr;

/// Amount drift beyond this fraction of the stored value is a conflict.
const AMOUNT_CONFLICT_RATIO: &str = "0.10";

/// Detect conflicts between the freshly consolidated record and an existing
/// document-store record: amount drift beyond 10% of the stored value, and
/// case-insensitive name mismatches. Conflicts never block; they flag.
pub fn detect_conflicts(
    stored: &DebtRecord,
    extracted: &ConsolidatedResult,
) -> Vec<FieldConflict> {
    let mut conflicts = Vec::new();

    let ratio = BigDecimal::from_str(AMOUNT_CONFLICT_RATIO).unwrap();
    let threshold = (&stored.amount * &ratio).abs();
    let drift = (&stored.amount - &extracted.final_amount).abs();
    if drift > threshold {
        conflicts.push(FieldConflict {
            field: "amount".to_string(),
            stored: stored.amount.to_string(),
            extracted: extracted.final_amount.to_string(),
        });
    }

    if let (Some(stored_client), Some(extracted_client)) =
        (&stored.client_name, &extracted.client_name)
    {
        if !stored_client.eq_ignore_ascii_case(extracted_client)
            && stored_client.to_lowercase() != extracted_client.to_lowercase()
        {
            conflicts.push(FieldConflict {
                field: "client_name".to_string(),
                stored: stored_client.clone(),
                extracted: extracted_client.clone(),
            });
        }
    }

    if let Some(extracted_creditor) = &extracted.creditor_name {
        if stored.creditor_identifier.to_lowercase() != extracted_creditor.to_lowercase() {
            conflicts.push(FieldConflict {
                field: "creditor_name".to_string(),
                stored: stored.creditor_identifier.clone(),
                extracted: extracted_creditor.clone(),
            });
        }
    }

    conflicts
}

/// Agent 3: look up an existing debt record (ticket id first, client name
/// as the fallback), resolve the match against outstanding inquiries, and
/// detect conflicts. Idempotent on retry through the stored checkpoint.
#[tracing::instrument(skip_all, fields(job_id = %job.id))]
pub async fn run(
    pool: &sqlx::PgPool,
    doc: &dyn DocumentStore,
    matcher: &dyn Matcher,
    job: &JobRow,
    extracted: &ConsolidatedResult,
) -> Result<Agent3Checkpoint, ProcessingError> {
    if let Some(existing) = job.agent_checkpoints.0.get(AGENT3_KEY) {
        if let Ok(parsed) = serde_json::from_value::<Agent3Checkpoint>(existing.clone()) {
            tracing::debug!("reusing consolidation checkpoint");
            return Ok(parsed);
        }
    }

    // Ticket-id hit wins; the client-name fallback runs only on an empty
    // ticket lookup.
    let (stored, doc_lookup) = match doc.fetch_by_ticket(&job.ticket_id).await {
        Ok(Some(record)) => (Some(record), Some("ticket_id".to_string())),
        Ok(None) => match &extracted.client_name {
            Some(client_name) => match doc.fetch_by_client_name(client_name).await {
                Ok(Some(record)) => (Some(record), Some("client_name".to_string())),
                Ok(None) => (None, None),
                Err(err) if err.is_transient() => {
                    return Err(ProcessingError::transient(err.to_string()))
                }
                Err(err) => return Err(ProcessingError::permanent(err.to_string())),
            },
            None => (None, None),
        },
        Err(err) if err.is_transient() => {
            return Err(ProcessingError::transient(err.to_string()))
        }
        Err(err) => return Err(ProcessingError::permanent(err.to_string())),
    };

    let query = MatchQuery {
        ticket_id: job.ticket_id.clone(),
        case_reference: extract_case_reference(&job.body_text),
        client_name: extracted.client_name.clone(),
        creditor_name: extracted.creditor_name.clone(),
    };
    let match_outcome = matcher
        .resolve(&query)
        .await
        .map_err(|err| ProcessingError::transient(format!("matcher: {err:#}")))?;

    let conflicts = stored
        .as_ref()
        .map(|record| detect_conflicts(record, extracted))
        .unwrap_or_default();

    let checkpoint = Agent3Checkpoint {
        status: if conflicts.is_empty() {
            CheckpointStatus::Passed
        } else {
            CheckpointStatus::NeedsReview
        },
        match_outcome: Some(match_outcome),
        conflicts,
        doc_lookup,
        completed_at: Utc::now(),
    };

    let value = serde_json::to_value(&checkpoint)
        .map_err(|err| ProcessingError::permanent(format!("encoding checkpoint: {err}")))?;
    jobs::record_checkpoint(pool, job.id, AGENT3_KEY, &value)
        .await
        .map_err(ProcessingError::from)?;
    Ok(checkpoint)
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{Confidence, SourceKind};

    fn consolidated(amount: &str, client: Option<&str>, creditor: Option<&str>) -> ConsolidatedResult {
        ConsolidatedResult {
            final_amount: BigDecimal::from_str(amount).unwrap(),
            amount_is_fallback: false,
            amount_confidence: Confidence::High,
            client_name: client.map(str::to_string),
            creditor_name: creditor.map(str::to_string),
            sources_processed: vec![SourceKind::EmailBody],
            sources_with_amount: 1,
            disagreeing_sources: 0,
            invalid_fields: Vec::new(),
            extraction_confidence: 0.8,
            total_tokens: 0,
            methods: Vec::new(),
        }
    }

    fn stored(amount: &str) -> DebtRecord {
        DebtRecord {
            ticket_id: "T-1".to_string(),
            creditor_identifier: "Inkasso Krüger".to_string(),
            client_name: Some("Anna Schäfer".to_string()),
            amount: BigDecimal::from_str(amount).unwrap(),
        }
    }

    #[test]
    fn amount_within_ten_percent_is_no_conflict() {
        let conflicts = detect_conflicts(
            &stored("100.00"),
            &consolidated("109.00", Some("Anna Schäfer"), Some("Inkasso Krüger")),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn amount_beyond_ten_percent_conflicts() {
        let conflicts = detect_conflicts(
            &stored("100.00"),
            &consolidated("120.00", Some("Anna Schäfer"), Some("Inkasso Krüger")),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "amount");
        assert_eq!(conflicts[0].stored, "100.00");
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        let conflicts = detect_conflicts(
            &stored("100.00"),
            &consolidated("100.00", Some("ANNA SCHÄFER"), Some("inkasso krüger")),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn differing_client_name_conflicts() {
        let conflicts = detect_conflicts(
            &stored("100.00"),
            &consolidated("100.00", Some("Bernd Möller"), Some("Inkasso Krüger")),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "client_name");
    }
}
