use bigdecimal::BigDecimal;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountParseError {
    /// The input contains no number at all.
    #[error("no number found")]
    NoNumber,
    /// The input contains a number whose locale cannot be decided,
    /// e.g. `1,234` (German decimal or US thousands).
    #[error("ambiguous number format: {0}")]
    Ambiguous(String),
    #[error("invalid number: {0}")]
    Invalid(String),
}

/// Parse a string holding one number, German locale first (`1.234,56`), with
/// a US fallback (`1,234.56`). An optional `EUR`/`€` suffix or prefix is
/// accepted. Ambiguous inputs fail with `Ambiguous`, distinguishable from
/// `NoNumber`.
pub fn parse_amount(input: &str) -> Result<BigDecimal, AmountParseError> {
    let mut s = input.trim();

    // Strip currency markers on either side.
    for marker in ["EUR", "eur", "Eur", "€"] {
        s = s
            .strip_suffix(marker)
            .or_else(|| s.strip_prefix(marker))
            .unwrap_or(s)
            .trim();
    }

    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return Err(AmountParseError::NoNumber);
    }
    if !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Err(AmountParseError::Invalid(input.trim().to_string()));
    }

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let canonical = match (commas, dots) {
        (0, 0) => s.to_string(),
        (c, d) if c > 0 && d > 0 => {
            let last_comma = s.rfind(',').unwrap();
            let last_dot = s.rfind('.').unwrap();
            if last_comma > last_dot {
                // German: dot groups, comma decimals.
                s.replace('.', "").replace(',', ".")
            } else {
                // US: comma groups, dot decimals.
                s.replace(',', "")
            }
        }
        (1, 0) => {
            let frac = &s[s.rfind(',').unwrap() + 1..];
            if frac.len() == 3 {
                // Could be a German decimal or a US thousands group.
                return Err(AmountParseError::Ambiguous(input.trim().to_string()));
            }
            s.replace(',', ".")
        }
        (_, 0) => {
            // Multiple commas can only be US thousand separators.
            s.replace(',', "")
        }
        (0, 1) => {
            let frac = &s[s.rfind('.').unwrap() + 1..];
            if frac.len() == 3 {
                // German locale first: a lone dot before three digits is a
                // thousands separator.
                s.replace('.', "")
            } else {
                s.to_string()
            }
        }
        (0, _) => {
            // Multiple dots can only be German thousand separators.
            s.replace('.', "")
        }
        _ => unreachable!(),
    };

    BigDecimal::from_str(&canonical)
        .map_err(|_| AmountParseError::Invalid(input.trim().to_string()))
}

/// An amount found in free text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAmount {
    pub amount: BigDecimal,
    /// True when found next to an explicit claim label rather than as a bare
    /// currency-tagged number.
    pub labeled: bool,
    pub label: Option<String>,
}

lazy_static::lazy_static! {
    static ref LABELED: regex::Regex = regex::Regex::new(
        r"(?i)\b(gesamtforderung|forderungsh(?:ö|oe)he|schulden|offener\s+betrag|restschuld|gesamtsumme)\b[^0-9€]{0,40}([0-9][0-9.,]*)",
    )
    .unwrap();

    static ref COMPONENT: regex::Regex = regex::Regex::new(
        r"(?i)\b(hauptforderung|zinsen|kosten)\b[^0-9€]{0,40}([0-9][0-9.,]*)",
    )
    .unwrap();

    static ref TAGGED: regex::Regex = regex::Regex::new(
        r"(?i)(?:([0-9][0-9.,]*)\s*(?:eur\b|€)|€\s*([0-9][0-9.,]*))",
    )
    .unwrap();
}

fn parse_candidate(raw: &str) -> Option<BigDecimal> {
    let trimmed = raw.trim_end_matches(['.', ',']);
    parse_amount(trimmed).ok()
}

/// Scan a free-text passage for the most plausible total claim amount:
/// labeled amounts first (Gesamtforderung and friends), then the component
/// sum Hauptforderung + Zinsen + Kosten, then any currency-tagged number
/// (largest wins). Decimal precision is preserved.
pub fn extract_amount(text: &str) -> Option<ExtractedAmount> {
    for caps in LABELED.captures_iter(text) {
        if let Some(amount) = parse_candidate(&caps[2]) {
            return Some(ExtractedAmount {
                amount,
                labeled: true,
                label: Some(caps[1].to_lowercase()),
            });
        }
    }

    // Components sum to the Gesamtforderung when no total is labelled.
    let mut principal: Option<BigDecimal> = None;
    let mut parts = BigDecimal::from(0);
    for caps in COMPONENT.captures_iter(text) {
        let Some(amount) = parse_candidate(&caps[2]) else {
            continue;
        };
        if caps[1].eq_ignore_ascii_case("hauptforderung") {
            principal = Some(amount);
        } else {
            parts += amount;
        }
    }
    if let Some(principal) = principal {
        return Some(ExtractedAmount {
            amount: principal + parts,
            labeled: true,
            label: Some("hauptforderung+zinsen+kosten".to_string()),
        });
    }

    let mut best: Option<BigDecimal> = None;
    for caps in TAGGED.captures_iter(text) {
        let raw = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
        let Some(amount) = parse_candidate(raw) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| amount > *b) {
            best = Some(amount);
        }
    }
    best.map(|amount| ExtractedAmount {
        amount,
        labeled: false,
        label: None,
    })
}

lazy_static::lazy_static! {
    static ref CASE_REF: regex::Regex = regex::Regex::new(
        r"(?i)\b(?:aktenzeichen|gesch(?:ä|ae)ftszeichen|az|gz|zeichen)\b\.?\s*:?\s*([A-Za-z0-9][A-Za-z0-9./-]{2,30})",
    )
    .unwrap();
}

/// Extract a case reference (Aktenzeichen) from free text, if present.
pub fn extract_case_reference(text: &str) -> Option<String> {
    CASE_REF
        .captures(text)
        .map(|caps| caps[1].trim_end_matches(['.', '-']).to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn german_amount_with_currency() {
        assert_eq!(parse_amount("1.234,56 EUR").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("1.234,56€").unwrap(), dec("1234.56"));
    }

    #[test]
    fn us_amount_with_currency() {
        assert_eq!(parse_amount("1,234.56 EUR").unwrap(), dec("1234.56"));
    }

    #[test]
    fn lone_three_digit_comma_group_is_ambiguous() {
        assert_eq!(
            parse_amount("1,234"),
            Err(AmountParseError::Ambiguous("1,234".to_string()))
        );
    }

    #[test]
    fn no_number_is_distinguishable() {
        assert_eq!(parse_amount("EUR"), Err(AmountParseError::NoNumber));
        assert_eq!(parse_amount(""), Err(AmountParseError::NoNumber));
    }

    #[test]
    fn german_decimal_without_groups() {
        assert_eq!(parse_amount("130,50").unwrap(), dec("130.50"));
        assert_eq!(parse_amount("0,99").unwrap(), dec("0.99"));
    }

    #[test]
    fn german_thousands_without_decimals() {
        assert_eq!(parse_amount("1.234").unwrap(), dec("1234"));
        assert_eq!(parse_amount("1.234.567").unwrap(), dec("1234567"));
    }

    #[test]
    fn plain_numbers() {
        assert_eq!(parse_amount("250").unwrap(), dec("250"));
        assert_eq!(parse_amount("12.34").unwrap(), dec("12.34"));
    }

    #[test]
    fn extracts_labeled_gesamtforderung() {
        let found =
            extract_amount("Die Gesamtforderung beträgt 1.234,56 EUR zum Stichtag.").unwrap();
        assert_eq!(found.amount, dec("1234.56"));
        assert!(found.labeled);
        assert_eq!(found.label.as_deref(), Some("gesamtforderung"));
    }

    #[test]
    fn extracts_restored_digraph_label() {
        let found = extract_amount("Forderungshoehe: 500,00 EUR").unwrap();
        assert_eq!(found.amount, dec("500.00"));
        assert!(found.labeled);
    }

    #[test]
    fn sums_components_when_no_total_is_labeled() {
        let text = "Hauptforderung 1.000,00 EUR, Zinsen 50,00 EUR, Kosten 25,00 EUR";
        let found = extract_amount(text).unwrap();
        assert_eq!(found.amount, dec("1075.00"));
        assert!(found.labeled);
    }

    #[test]
    fn falls_back_to_currency_tagged_number() {
        let found = extract_amount("Bitte überweisen Sie 89,90 EUR bis Freitag.").unwrap();
        assert_eq!(found.amount, dec("89.90"));
        assert!(!found.labeled);
    }

    #[test]
    fn largest_tagged_number_wins_within_body() {
        let found = extract_amount("Teilbetrag 50,00 EUR von insgesamt 120,00 EUR").unwrap();
        assert_eq!(found.amount, dec("120.00"));
    }

    #[test]
    fn no_amount_yields_none() {
        assert_eq!(extract_amount("Vielen Dank für Ihre Nachricht."), None);
    }

    #[test]
    fn case_reference_extraction() {
        assert_eq!(
            extract_case_reference("Aktenzeichen: 12-AB/3456 vom 01.02.").as_deref(),
            Some("12-AB/3456")
        );
        assert_eq!(
            extract_case_reference("unter Az. KX-99/21 geführt").as_deref(),
            Some("KX-99/21")
        );
        assert_eq!(extract_case_reference("keine Referenz"), None);
    }
}
