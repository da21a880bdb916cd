//! End-to-end checks of the pure pipeline path: body extraction through
//! consolidation, confidence aggregation, and routing. Vendor, store, and
//! matcher stay out of the loop; the matcher outcome is fixed per case.

use bigdecimal::BigDecimal;
use chrono::Utc;
use models::{
    Agent1Checkpoint, CheckpointStatus, Intent, MatchOutcome, MatchStatus, RouteAction,
    RouteThresholds,
};
use pipeline::{confidence, consolidate::consolidate};
use std::str::FromStr;

fn debt_statement_intent() -> Agent1Checkpoint {
    Agent1Checkpoint {
        status: CheckpointStatus::Passed,
        intent: Intent::DebtStatement,
        confidence: 0.95,
        rule_based: false,
        skip_extraction: false,
        tokens_used: 120,
        completed_at: Utc::now(),
    }
}

fn auto_matched(score: f64) -> MatchOutcome {
    MatchOutcome {
        score,
        status: MatchStatus::AutoMatched,
        candidate_id: Some("0000000000000001".to_string()),
    }
}

#[test]
fn labeled_german_body_with_parties_auto_updates() {
    let body = extract::extract_body(
        "Gläubiger: Stadtwerke Bochum GmbH\n\
         Schuldnerin: Anna Schäfer\n\
         Die Gesamtforderung beträgt 1.234,56 EUR",
    );
    assert_eq!(
        body.gesamt_amount,
        Some(BigDecimal::from_str("1234.56").unwrap())
    );

    let consolidated = consolidate(&[body]);
    assert_eq!(
        consolidated.final_amount,
        BigDecimal::from_str("1234.56").unwrap()
    );

    let report = confidence::report(&debt_statement_intent(), &consolidated, &auto_matched(0.92));
    let action = confidence::route(report.overall, &RouteThresholds::default());
    assert_eq!(action, RouteAction::AutoUpdate);
}

#[test]
fn labeled_body_without_parties_writes_and_notifies() {
    let body = extract::extract_body("Die Gesamtforderung beträgt 1.234,56 EUR");
    let consolidated = consolidate(&[body]);

    // Both party names are missing, which costs two completeness steps.
    let report = confidence::report(&debt_statement_intent(), &consolidated, &auto_matched(0.92));
    assert!(report.overall < 0.85);
    let action = confidence::route(report.overall, &RouteThresholds::default());
    assert_eq!(action, RouteAction::UpdateAndNotify);
}

#[test]
fn disagreeing_attachment_amount_wins_by_height() {
    let body = extract::extract_body("Offener Betrag: 100,00 EUR");
    let mut attachment = body.clone();
    attachment.source = models::SourceKind::NativePdf;
    attachment.source_name = "forderung.pdf".to_string();
    attachment.gesamt_amount = Some(BigDecimal::from_str("120.00").unwrap());

    let consolidated = consolidate(&[body, attachment]);
    assert_eq!(
        consolidated.final_amount,
        BigDecimal::from_str("120.00").unwrap()
    );
    assert_eq!(consolidated.disagreeing_sources, 2);
}

#[test]
fn no_amount_anywhere_goes_to_manual_review() {
    let body = extract::extract_body("Wir melden uns zu Ihrer Anfrage zurück.");
    let consolidated = consolidate(&[body]);

    assert_eq!(
        consolidated.final_amount,
        BigDecimal::from_str("100.00").unwrap()
    );
    assert!(consolidated.amount_is_fallback);

    let report = confidence::report(&debt_statement_intent(), &consolidated, &auto_matched(0.92));
    assert!(report.overall < 0.60);
    let action = confidence::route(report.overall, &RouteThresholds::default());
    assert_eq!(action, RouteAction::ManualReview);
}

#[test]
fn rerunning_consolidation_is_deterministic() {
    let body = extract::extract_body("Restschuld: 512,30 EUR");
    let first = consolidate(&[body.clone()]);
    let second = consolidate(&[body]);
    assert_eq!(first.final_amount, second.final_amount);
    assert_eq!(first.sources_processed, second.sources_processed);
    assert_eq!(first.extraction_confidence, second.extraction_confidence);
}
