use models::{
    Agent1Checkpoint, ConfidenceDimension, ConfidenceReport, ConsolidatedResult, MatchOutcome,
    RouteAction, RouteThresholds,
};

/// Build the per-job confidence report. Intent confidence is reported but
/// excluded from the aggregate by default; Agent 1 enforces its own gate.
/// The aggregate is the weakest link of the dimensions used.
pub fn report(
    intent: &Agent1Checkpoint,
    extraction: &ConsolidatedResult,
    match_outcome: &MatchOutcome,
) -> ConfidenceReport {
    let extraction_confidence = extraction.extraction_confidence;
    let match_confidence = match_outcome.adjusted_confidence();

    let (overall, weakest) = if extraction_confidence <= match_confidence {
        (extraction_confidence, ConfidenceDimension::Extraction)
    } else {
        (match_confidence, ConfidenceDimension::Match)
    };

    ConfidenceReport {
        extraction: extraction_confidence,
        match_: match_confidence,
        intent: intent.confidence,
        overall,
        weakest,
    }
}

/// Three-tier dispatch. A pure function of its inputs.
pub fn route(overall: f64, thresholds: &RouteThresholds) -> RouteAction {
    if overall > thresholds.high {
        RouteAction::AutoUpdate
    } else if overall >= thresholds.low {
        RouteAction::UpdateAndNotify
    } else {
        RouteAction::ManualReview
    }
}

/// The coarse bucket recorded with calibration samples.
pub fn bucket(overall: f64, thresholds: &RouteThresholds) -> &'static str {
    if overall > thresholds.high {
        "high"
    } else if overall >= thresholds.low {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use models::{CheckpointStatus, Confidence, Intent, MatchStatus, SourceKind};

    fn intent(confidence: f64) -> Agent1Checkpoint {
        Agent1Checkpoint {
            status: CheckpointStatus::Passed,
            intent: Intent::DebtStatement,
            confidence,
            rule_based: false,
            skip_extraction: false,
            tokens_used: 0,
            completed_at: Utc::now(),
        }
    }

    fn extraction(confidence: f64) -> ConsolidatedResult {
        ConsolidatedResult {
            final_amount: bigdecimal::BigDecimal::from(100),
            amount_is_fallback: false,
            amount_confidence: Confidence::High,
            client_name: None,
            creditor_name: None,
            sources_processed: vec![SourceKind::EmailBody],
            sources_with_amount: 1,
            disagreeing_sources: 0,
            invalid_fields: Vec::new(),
            extraction_confidence: confidence,
            total_tokens: 0,
            methods: Vec::new(),
        }
    }

    fn matched(score: f64, status: MatchStatus) -> MatchOutcome {
        MatchOutcome {
            score,
            status,
            candidate_id: Some("inq-1".to_string()),
        }
    }

    #[test]
    fn overall_is_the_weakest_dimension() {
        let report = report(
            &intent(0.95),
            &extraction(0.9),
            &matched(0.7, MatchStatus::AutoMatched),
        );
        assert_eq!(report.overall, 0.7);
        assert_eq!(report.weakest, ConfidenceDimension::Match);

        let report = super::report(
            &intent(0.95),
            &extraction(0.5),
            &matched(0.9, MatchStatus::AutoMatched),
        );
        assert_eq!(report.overall, 0.5);
        assert_eq!(report.weakest, ConfidenceDimension::Extraction);
    }

    #[test]
    fn intent_is_reported_but_excluded() {
        let report = report(
            &intent(0.1),
            &extraction(0.9),
            &matched(0.9, MatchStatus::AutoMatched),
        );
        assert_eq!(report.intent, 0.1);
        assert_eq!(report.overall, 0.9);
    }

    #[test]
    fn ambiguous_match_is_discounted() {
        let report = report(
            &intent(0.9),
            &extraction(0.9),
            &matched(0.9, MatchStatus::Ambiguous),
        );
        assert!((report.match_ - 0.63).abs() < 1e-9);
        assert_eq!(report.weakest, ConfidenceDimension::Match);
    }

    #[test]
    fn no_match_zeroes_the_dimension() {
        let report = report(
            &intent(0.9),
            &extraction(0.9),
            &matched(0.9, MatchStatus::NoMatch),
        );
        assert_eq!(report.match_, 0.0);
        assert_eq!(report.overall, 0.0);
    }

    #[test]
    fn routing_tiers_at_default_thresholds() {
        let thresholds = RouteThresholds::default();
        assert_eq!(route(0.95, &thresholds), RouteAction::AutoUpdate);
        assert_eq!(route(0.85, &thresholds), RouteAction::UpdateAndNotify);
        assert_eq!(route(0.75, &thresholds), RouteAction::UpdateAndNotify);
        assert_eq!(route(0.60, &thresholds), RouteAction::UpdateAndNotify);
        assert_eq!(route(0.59, &thresholds), RouteAction::ManualReview);
        assert_eq!(route(0.0, &thresholds), RouteAction::ManualReview);
    }

    #[test]
    fn routing_is_deterministic() {
        let thresholds = RouteThresholds::default();
        for _ in 0..3 {
            assert_eq!(route(0.7, &thresholds), RouteAction::UpdateAndNotify);
        }
    }
}
