use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// The kind of source a single extraction result came from. Ordering is the
/// consolidation priority: earlier kinds are trusted over later ones.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    NativePdf,
    Docx,
    Xlsx,
    ScannedPdf,
    EmailBody,
    Image,
    Unknown,
}

impl SourceKind {
    /// Baseline confidence for a successful extraction from this source.
    pub fn confidence_baseline(&self) -> f64 {
        match self {
            SourceKind::NativePdf => 0.95,
            SourceKind::Docx => 0.90,
            SourceKind::Xlsx => 0.85,
            SourceKind::EmailBody => 0.80,
            SourceKind::ScannedPdf => 0.75,
            SourceKind::Image => 0.70,
            SourceKind::Unknown => 0.60,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::NativePdf => "native_pdf",
            SourceKind::Docx => "docx",
            SourceKind::Xlsx => "xlsx",
            SourceKind::ScannedPdf => "scanned_pdf",
            SourceKind::EmailBody => "email_body",
            SourceKind::Image => "image",
            SourceKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Strength for comparisons: HIGH > MEDIUM > LOW.
    pub fn score(&self) -> u8 {
        match self {
            Confidence::High => 3,
            Confidence::Medium => 2,
            Confidence::Low => 1,
        }
    }

    /// Clamp to a ceiling: the result is never stronger than `ceiling`.
    pub fn cap_at(self, ceiling: Confidence) -> Confidence {
        if self.score() > ceiling.score() {
            ceiling
        } else {
            self
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    NativeText,
    Vision,
    Regex,
    TableScan,
    Skipped,
}

/// The uniform per-source extraction result. Every extractor produces this
/// shape; a skipped or failed source records `error` and leaves the fields
/// empty rather than failing the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source: SourceKind,
    /// Name of the originating attachment, or "body" for the email body.
    pub source_name: String,
    pub gesamt_amount: Option<BigDecimal>,
    /// True when the amount was found next to an explicit label
    /// (Gesamtforderung etc.) rather than as a bare currency-tagged number.
    #[serde(default)]
    pub labeled_amount: bool,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub confidence: Confidence,
    pub method: ExtractionMethod,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn skipped(source: SourceKind, source_name: impl Into<String>, error: String) -> Self {
        Self {
            source,
            source_name: source_name.into(),
            gesamt_amount: None,
            labeled_amount: false,
            client_name: None,
            creditor_name: None,
            confidence: Confidence::Low,
            method: ExtractionMethod::Skipped,
            tokens_used: 0,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.method != ExtractionMethod::Skipped
    }
}

/// The fused, authoritative record produced by the consolidator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub final_amount: BigDecimal,
    /// True when the final amount is the fixed fallback, not an extraction.
    #[serde(default)]
    pub amount_is_fallback: bool,
    pub amount_confidence: Confidence,
    pub client_name: Option<String>,
    pub creditor_name: Option<String>,
    pub sources_processed: Vec<SourceKind>,
    pub sources_with_amount: u32,
    /// Count of distinct amounts that disagreed across sources.
    #[serde(default)]
    pub disagreeing_sources: u32,
    /// Adopted fields whose values failed validation. The values are kept
    /// (validation never nulls a field); these names flag the job for
    /// review.
    #[serde(default)]
    pub invalid_fields: Vec<String>,
    /// Document-level extraction confidence, weakest-link with completeness
    /// penalty, in `[0.3, 1.0]`.
    pub extraction_confidence: f64,
    pub total_tokens: u64,
    pub methods: Vec<ExtractionMethod>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn source_priority_ordering() {
        assert!(SourceKind::NativePdf < SourceKind::Docx);
        assert!(SourceKind::Docx < SourceKind::Xlsx);
        assert!(SourceKind::Xlsx < SourceKind::ScannedPdf);
        assert!(SourceKind::ScannedPdf < SourceKind::EmailBody);
        assert!(SourceKind::EmailBody < SourceKind::Image);
        assert!(SourceKind::Image < SourceKind::Unknown);
    }

    #[test]
    fn baselines_follow_priority() {
        let kinds = [
            SourceKind::NativePdf,
            SourceKind::Docx,
            SourceKind::Xlsx,
            SourceKind::ScannedPdf,
            SourceKind::EmailBody,
            SourceKind::Image,
            SourceKind::Unknown,
        ];
        for k in kinds {
            let b = k.confidence_baseline();
            assert!((0.0..=1.0).contains(&b));
        }
        assert_eq!(SourceKind::NativePdf.confidence_baseline(), 0.95);
        assert_eq!(SourceKind::Unknown.confidence_baseline(), 0.60);
    }
}
