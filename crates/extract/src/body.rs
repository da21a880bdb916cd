use localize::{extract_amount, preprocess};
use models::{Confidence, ExtractionMethod, ExtractionResult, SourceKind};

lazy_static::lazy_static! {
    static ref CREDITOR: regex::Regex = regex::Regex::new(
        r"(?im)^.*\b(?:gläubiger(?:in)?|forderungsinhaber)\b\s*:?\s*(.{3,80})$",
    )
    .unwrap();

    static ref CLIENT: regex::Regex = regex::Regex::new(
        r"(?im)^.*\b(?:schuldner(?:in)?|mandant(?:in)?)\b\s*:?\s*(.{3,80})$",
    )
    .unwrap();
}

fn labeled_name(re: &regex::Regex, text: &str) -> Option<String> {
    let candidate = re.captures(text)?.get(1)?.as_str();
    // A candidate failing validate_name is still returned; validation
    // failures flag for review downstream but never null the field.
    Some(
        candidate
            .trim()
            .trim_end_matches(['.', ',', ';'])
            .trim()
            .to_string(),
    )
}

/// Labeled client (Schuldner/Mandant) and creditor (Gläubiger) candidates
/// from already-preprocessed text.
pub(crate) fn labeled_parties(text: &str) -> (Option<String>, Option<String>) {
    (labeled_name(&CLIENT, text), labeled_name(&CREDITOR, text))
}

/// Extract from the email body itself: preprocessing, labeled amount scan
/// with a currency-tagged fallback, and labeled party names. Pure regex
/// work, zero token cost.
pub fn extract_body(body_text: &str) -> ExtractionResult {
    let prepared = preprocess(body_text);
    let found = extract_amount(&prepared.text);

    let (amount, labeled, confidence) = match found {
        Some(found) if found.labeled => (Some(found.amount), true, Confidence::High),
        Some(found) => (Some(found.amount), false, Confidence::Medium),
        None => (None, false, Confidence::Low),
    };

    let (client_name, creditor_name) = labeled_parties(&prepared.text);

    ExtractionResult {
        source: SourceKind::EmailBody,
        source_name: "body".to_string(),
        gesamt_amount: amount,
        labeled_amount: labeled,
        client_name,
        creditor_name,
        confidence,
        method: ExtractionMethod::Regex,
        tokens_used: 0,
        error: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn labeled_german_amount_in_body() {
        let result = extract_body("Die Gesamtforderung beträgt 1.234,56 EUR");
        assert_eq!(
            result.gesamt_amount,
            Some(BigDecimal::from_str("1234.56").unwrap())
        );
        assert!(result.labeled_amount);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.method, ExtractionMethod::Regex);
    }

    #[test]
    fn body_with_ocr_digraphs_is_restored_before_scanning() {
        let result = extract_body("Forderungshoehe: 890,10 EUR\nGlaeubiger: Mueller Inkasso");
        assert_eq!(
            result.gesamt_amount,
            Some(BigDecimal::from_str("890.10").unwrap())
        );
        assert_eq!(result.creditor_name.as_deref(), Some("Müller Inkasso"));
    }

    #[test]
    fn labeled_parties() {
        let text = "Gläubiger: Stadtwerke Bochum GmbH\nSchuldnerin: Anna Schäfer\nOffener Betrag: 210,00 EUR";
        let result = extract_body(text);
        assert_eq!(
            result.creditor_name.as_deref(),
            Some("Stadtwerke Bochum GmbH")
        );
        assert_eq!(result.client_name.as_deref(), Some("Anna Schäfer"));
        assert!(result.labeled_amount);
    }

    #[test]
    fn unlabeled_amount_is_medium_confidence() {
        let result = extract_body("Bitte zahlen Sie 75,50 EUR bis Monatsende.");
        assert_eq!(
            result.gesamt_amount,
            Some(BigDecimal::from_str("75.50").unwrap())
        );
        assert!(!result.labeled_amount);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn no_amount_is_low_confidence_not_an_error() {
        let result = extract_body("Vielen Dank für Ihre Geduld.");
        assert_eq!(result.gesamt_amount, None);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.error.is_none());
    }
}
