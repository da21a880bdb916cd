use bigdecimal::BigDecimal;
use models::{Confidence, ConsolidatedResult, ExtractionResult, SourceKind};
use std::str::FromStr;

/// Amounts within this distance of one another represent the same value.
fn dedup_tolerance() -> BigDecimal {
    BigDecimal::from_str("1.00").unwrap()
}

/// The fixed fallback when no source yielded an amount.
fn fallback_amount() -> BigDecimal {
    BigDecimal::from_str("100.00").unwrap()
}

/// Effective quality of one source's contribution: the source baseline,
/// nudged by the extractor's own confidence in what it read.
fn quality(result: &ExtractionResult) -> f64 {
    let baseline = result.source.confidence_baseline();
    let adjusted = match result.confidence {
        Confidence::High => baseline + 0.15,
        Confidence::Medium => baseline,
        Confidence::Low => baseline - 0.15,
    };
    adjusted.clamp(0.0, 1.0)
}

fn is_native_format(source: SourceKind) -> bool {
    matches!(
        source,
        SourceKind::NativePdf | SourceKind::Docx | SourceKind::Xlsx
    )
}

/// Pick a name candidate: highest-priority source first, ties broken by
/// stronger per-source confidence, then by the longer name.
fn pick_name<'a>(
    results: &'a [&ExtractionResult],
    get: impl Fn(&ExtractionResult) -> Option<&str>,
) -> Option<(String, &'a ExtractionResult)> {
    let mut candidates: Vec<(&str, &&ExtractionResult)> = results
        .iter()
        .filter_map(|result| get(result).map(|name| (name, result)))
        .collect();
    candidates.sort_by(|(a_name, a), (b_name, b)| {
        a.source
            .cmp(&b.source)
            .then(b.confidence.score().cmp(&a.confidence.score()))
            .then(b_name.chars().count().cmp(&a_name.chars().count()))
    });
    candidates
        .first()
        .map(|(name, result)| (name.to_string(), **result))
}

/// Fuse the ordered per-source results of one job into the authoritative
/// consolidated record. Pure arithmetic and comparison; never calls a model.
pub fn consolidate(results: &[ExtractionResult]) -> ConsolidatedResult {
    let successful: Vec<&ExtractionResult> = results.iter().filter(|r| r.succeeded()).collect();
    let total_tokens: u64 = results.iter().map(|r| r.tokens_used).sum();

    // Collect and order all amounts, highest first.
    let mut amounts: Vec<&ExtractionResult> = successful
        .iter()
        .copied()
        .filter(|r| r.gesamt_amount.is_some())
        .collect();
    amounts.sort_by(|a, b| {
        b.gesamt_amount
            .as_ref()
            .unwrap()
            .cmp(a.gesamt_amount.as_ref().unwrap())
    });

    // Deduplicate: amounts within 1.00 EUR of a kept representative are the
    // same value.
    let tolerance = dedup_tolerance();
    let mut representatives: Vec<Vec<&ExtractionResult>> = Vec::new();
    for result in amounts {
        let amount = result.gesamt_amount.as_ref().unwrap();
        match representatives.iter_mut().find(|cluster| {
            let rep = cluster[0].gesamt_amount.as_ref().unwrap();
            (rep - amount).abs() <= tolerance
        }) {
            Some(cluster) => cluster.push(result),
            None => representatives.push(vec![result]),
        }
    }

    let sources_with_amount = representatives.iter().map(|c| c.len()).sum::<usize>() as u32;
    let disagreeing_sources = if representatives.len() > 1 {
        representatives.len() as u32
    } else {
        0
    };

    // Highest amount wins; its corroborating cluster carries the amount's
    // contribution quality (best corroborator counts).
    let winner = representatives.first();
    let (final_amount, amount_is_fallback, amount_confidence, amount_quality) = match winner {
        None => (fallback_amount(), true, Confidence::Low, None),
        Some(cluster) => {
            let best = cluster
                .iter()
                .map(|r| quality(r))
                .fold(f64::MIN, f64::max);
            let lead = cluster[0];
            let confidence = if representatives.len() == 1 {
                if is_native_format(lead.source) && lead.labeled_amount {
                    Confidence::High
                } else {
                    Confidence::Medium
                }
            } else {
                Confidence::Medium
            };
            (
                lead.gesamt_amount.clone().unwrap(),
                false,
                confidence,
                Some(best),
            )
        }
    };

    let client = pick_name(&successful, |r| r.client_name.as_deref());
    let creditor = pick_name(&successful, |r| r.creditor_name.as_deref());

    // Validate the adopted names. A failed field keeps its value and is
    // flagged instead of nulled.
    let mut invalid_fields = Vec::new();
    if let Some((name, _)) = &client {
        if !localize::validate_name(name) {
            invalid_fields.push("client_name".to_string());
        }
    }
    if let Some((name, _)) = &creditor {
        if !localize::validate_name(name) {
            invalid_fields.push("creditor_name".to_string());
        }
    }

    // Weakest link across the sources that actually contributed adopted
    // values; with nothing adopted, the weakest successful source stands in.
    let mut contributions: Vec<f64> = Vec::new();
    if let Some(q) = amount_quality {
        contributions.push(q);
    }
    if let Some((_, result)) = &client {
        contributions.push(quality(result));
    }
    if let Some((_, result)) = &creditor {
        contributions.push(quality(result));
    }
    let base = if contributions.is_empty() {
        successful
            .iter()
            .map(|r| quality(r))
            .fold(f64::MAX, f64::min)
            .min(SourceKind::Unknown.confidence_baseline())
    } else {
        contributions.iter().copied().fold(f64::MAX, f64::min)
    };

    let mut missing = 0u32;
    if amount_is_fallback {
        missing += 1;
    }
    if client.is_none() {
        missing += 1;
    }
    if creditor.is_none() {
        missing += 1;
    }
    let extraction_confidence = (base - 0.1 * missing as f64).clamp(0.3, 1.0);

    let mut methods: Vec<_> = successful.iter().map(|r| r.method).collect();
    methods.dedup();

    ConsolidatedResult {
        final_amount,
        amount_is_fallback,
        amount_confidence,
        client_name: client.map(|(name, _)| name),
        creditor_name: creditor.map(|(name, _)| name),
        sources_processed: successful.iter().map(|r| r.source).collect(),
        sources_with_amount,
        disagreeing_sources,
        invalid_fields,
        extraction_confidence,
        total_tokens,
        methods,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::ExtractionMethod;

    fn result(
        source: SourceKind,
        amount: Option<&str>,
        labeled: bool,
        confidence: Confidence,
    ) -> ExtractionResult {
        ExtractionResult {
            source,
            source_name: source.as_str().to_string(),
            gesamt_amount: amount.map(|a| BigDecimal::from_str(a).unwrap()),
            labeled_amount: labeled,
            client_name: None,
            creditor_name: None,
            confidence,
            method: ExtractionMethod::Regex,
            tokens_used: 0,
            error: None,
        }
    }

    #[test]
    fn single_labeled_body_amount() {
        let body = result(
            SourceKind::EmailBody,
            Some("1234.56"),
            true,
            Confidence::High,
        );
        let consolidated = consolidate(&[body]);
        assert_eq!(
            consolidated.final_amount,
            BigDecimal::from_str("1234.56").unwrap()
        );
        assert!(!consolidated.amount_is_fallback);
        assert_eq!(consolidated.sources_with_amount, 1);
        assert_eq!(consolidated.disagreeing_sources, 0);
    }

    #[test]
    fn highest_amount_wins_across_sources() {
        let body = result(
            SourceKind::EmailBody,
            Some("100.00"),
            true,
            Confidence::High,
        );
        let pdf = result(
            SourceKind::NativePdf,
            Some("120.00"),
            true,
            Confidence::High,
        );
        let consolidated = consolidate(&[body, pdf]);
        assert_eq!(
            consolidated.final_amount,
            BigDecimal::from_str("120.00").unwrap()
        );
        assert_eq!(consolidated.disagreeing_sources, 2);
    }

    #[test]
    fn amounts_within_one_euro_are_the_same_value() {
        let body = result(
            SourceKind::EmailBody,
            Some("120.00"),
            true,
            Confidence::High,
        );
        let pdf = result(
            SourceKind::NativePdf,
            Some("120.50"),
            true,
            Confidence::High,
        );
        let consolidated = consolidate(&[body, pdf]);
        assert_eq!(consolidated.disagreeing_sources, 0);
        assert_eq!(consolidated.sources_with_amount, 2);
        assert_eq!(
            consolidated.final_amount,
            BigDecimal::from_str("120.50").unwrap()
        );
    }

    #[test]
    fn no_amount_falls_back_to_fixed_value() {
        let body = result(SourceKind::EmailBody, None, false, Confidence::Low);
        let consolidated = consolidate(&[body]);
        assert_eq!(
            consolidated.final_amount,
            BigDecimal::from_str("100.00").unwrap()
        );
        assert!(consolidated.amount_is_fallback);
        assert_eq!(consolidated.amount_confidence, Confidence::Low);
        // Body base minus three missing key fields, floored well below the
        // manual-review threshold.
        assert!(consolidated.extraction_confidence < 0.60);
    }

    #[test]
    fn single_native_labeled_amount_is_high_confidence() {
        let pdf = result(
            SourceKind::NativePdf,
            Some("420.00"),
            true,
            Confidence::High,
        );
        let consolidated = consolidate(&[pdf]);
        assert_eq!(consolidated.amount_confidence, Confidence::High);
    }

    #[test]
    fn names_prefer_higher_priority_sources() {
        let mut body = result(
            SourceKind::EmailBody,
            Some("90.00"),
            true,
            Confidence::High,
        );
        body.client_name = Some("A. Schäfer".to_string());
        body.creditor_name = Some("Inkasso Krüger".to_string());
        let mut pdf = result(
            SourceKind::NativePdf,
            Some("90.10"),
            true,
            Confidence::Medium,
        );
        pdf.client_name = Some("Anna Schäfer".to_string());

        let consolidated = consolidate(&[body, pdf]);
        // Client from the native PDF (higher priority) despite lower
        // per-source confidence; creditor only the body offered.
        assert_eq!(consolidated.client_name.as_deref(), Some("Anna Schäfer"));
        assert_eq!(
            consolidated.creditor_name.as_deref(),
            Some("Inkasso Krüger")
        );
    }

    #[test]
    fn adopted_names_are_validated_but_never_nulled() {
        let mut body = result(
            SourceKind::EmailBody,
            Some("90.00"),
            true,
            Confidence::High,
        );
        body.client_name = Some("Anna Schäfer".to_string());
        // An OCR shred that cannot be a name.
        body.creditor_name = Some("##12//".to_string());

        let consolidated = consolidate(&[body]);
        assert_eq!(consolidated.creditor_name.as_deref(), Some("##12//"));
        assert_eq!(consolidated.invalid_fields, vec!["creditor_name"]);
    }

    #[test]
    fn valid_names_raise_no_flags() {
        let mut body = result(
            SourceKind::EmailBody,
            Some("90.00"),
            true,
            Confidence::High,
        );
        body.client_name = Some("Anna Schäfer".to_string());
        body.creditor_name = Some("Inkasso Krüger".to_string());
        let consolidated = consolidate(&[body]);
        assert!(consolidated.invalid_fields.is_empty());
    }

    #[test]
    fn skipped_sources_do_not_contribute() {
        let skipped = ExtractionResult::skipped(
            SourceKind::NativePdf,
            "kaputt.pdf",
            "encrypted pdf".to_string(),
        );
        let body = result(
            SourceKind::EmailBody,
            Some("75.00"),
            true,
            Confidence::High,
        );
        let consolidated = consolidate(&[skipped, body]);
        assert_eq!(
            consolidated.final_amount,
            BigDecimal::from_str("75.00").unwrap()
        );
        assert_eq!(consolidated.sources_processed, vec![SourceKind::EmailBody]);
    }

    #[test]
    fn more_successful_sources_never_lower_confidence() {
        // A body-only job with nothing but an amount...
        let body = result(
            SourceKind::EmailBody,
            Some("300.00"),
            true,
            Confidence::High,
        );
        let fewer = consolidate(&[body.clone()]);

        // ...versus the same plus a native PDF corroborating the amount and
        // supplying both names.
        let mut pdf = result(
            SourceKind::NativePdf,
            Some("300.00"),
            true,
            Confidence::High,
        );
        pdf.client_name = Some("Anna Schäfer".to_string());
        pdf.creditor_name = Some("Stadtwerke Bochum".to_string());
        let more = consolidate(&[body, pdf]);

        assert!(more.extraction_confidence >= fewer.extraction_confidence);
    }

    #[test]
    fn token_usage_sums_across_all_sources() {
        let mut a = result(
            SourceKind::ScannedPdf,
            Some("100.00"),
            true,
            Confidence::High,
        );
        a.tokens_used = 1200;
        a.method = ExtractionMethod::Vision;
        let mut b = result(SourceKind::Image, None, false, Confidence::Low);
        b.tokens_used = 800;
        b.method = ExtractionMethod::Vision;
        let consolidated = consolidate(&[a, b]);
        assert_eq!(consolidated.total_tokens, 2000);
    }
}
