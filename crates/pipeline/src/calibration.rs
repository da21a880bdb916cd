use ingest_sql::jobs::JobRow;
use ingest_sql::reviews::ReviewRow;
use ingest_sql::calibration as calibration_sql;
use models::{
    ConsolidatedResult, CorrectionType, Id, ReviewResolution, RouteThresholds, SourceKind,
};

/// Document-type precedence for calibration samples. Differs from the
/// consolidation priority: scanned PDFs outrank DOCX here because the
/// sample describes what kind of document dominated the job.
fn doc_type_rank(kind: SourceKind) -> u8 {
    match kind {
        SourceKind::NativePdf => 0,
        SourceKind::ScannedPdf => 1,
        SourceKind::Docx => 2,
        SourceKind::Xlsx => 3,
        SourceKind::Image => 4,
        SourceKind::EmailBody => 5,
        SourceKind::Unknown => 6,
    }
}

fn document_type(extracted: Option<&ConsolidatedResult>) -> &'static str {
    extracted
        .map(|result| result.sources_processed.as_slice())
        .unwrap_or_default()
        .iter()
        .copied()
        .min_by_key(|kind| doc_type_rank(*kind))
        .map(|kind| kind.as_str())
        .unwrap_or(SourceKind::Unknown.as_str())
}

/// What a correction touched, with before/after detail.
fn correction(
    corrected: &serde_json::Value,
    extracted: Option<&ConsolidatedResult>,
) -> (Option<CorrectionType>, serde_json::Value) {
    let mut touched = Vec::new();
    let mut details = serde_json::Map::new();

    let fields = [
        ("amount", CorrectionType::Amount),
        ("client_name", CorrectionType::ClientName),
        ("creditor_name", CorrectionType::CreditorName),
        ("candidate_id", CorrectionType::Match),
    ];
    for (field, kind) in fields {
        let Some(after) = corrected.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        touched.push(kind);
        let before = extracted
            .map(|result| match field {
                "amount" => serde_json::json!(result.final_amount.to_string()),
                "client_name" => serde_json::json!(result.client_name),
                "creditor_name" => serde_json::json!(result.creditor_name),
                _ => serde_json::Value::Null,
            })
            .unwrap_or(serde_json::Value::Null);
        details.insert(
            field.to_string(),
            serde_json::json!({ "before": before, "after": after }),
        );
    }

    let kind = match touched.len() {
        0 => None,
        1 => Some(touched[0]),
        _ => Some(CorrectionType::Multiple),
    };
    (kind, serde_json::Value::Object(details))
}

/// Capture a calibration sample from a resolved review item. `approved` and
/// `corrected` carry a usable label; every other resolution is skipped.
#[tracing::instrument(skip_all, fields(job_id = %job.id, resolution = ?review.resolution))]
pub async fn capture_sample(
    pool: &sqlx::PgPool,
    sample_id: Id,
    review: &ReviewRow,
    job: &JobRow,
    thresholds: &RouteThresholds,
) -> anyhow::Result<bool> {
    let Some(resolution) = review.resolution else {
        return Ok(false);
    };
    let Some(was_correct) = resolution.was_correct() else {
        return Ok(false);
    };

    let extracted: Option<ConsolidatedResult> = job
        .extracted_data
        .as_ref()
        .and_then(|data| serde_json::from_value(data.0.clone()).ok());

    let overall = job.overall_confidence.unwrap_or(0.0);
    let dimensions = serde_json::json!({
        "extraction": job.extraction_confidence,
        "overall": job.overall_confidence,
        "route": job.confidence_route,
    });
    let bucket = crate::confidence::bucket(overall, thresholds);

    let (correction_type, correction_details) = if resolution == ReviewResolution::Corrected {
        let corrected = review
            .corrected_data
            .as_ref()
            .map(|data| data.0.clone())
            .unwrap_or(serde_json::Value::Null);
        correction(&corrected, extracted.as_ref())
    } else {
        (None, serde_json::Value::Null)
    };

    calibration_sql::insert(
        pool,
        sample_id,
        job.id,
        &dimensions,
        bucket,
        document_type(extracted.as_ref()),
        was_correct,
        correction_type,
        if correction_details.is_null() {
            None
        } else {
            Some(&correction_details)
        },
    )
    .await?;
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;
    use bigdecimal::BigDecimal;
    use models::Confidence;
    use std::str::FromStr;

    fn consolidated(sources: Vec<SourceKind>) -> ConsolidatedResult {
        ConsolidatedResult {
            final_amount: BigDecimal::from_str("120.00").unwrap(),
            amount_is_fallback: false,
            amount_confidence: Confidence::High,
            client_name: Some("Anna Schäfer".to_string()),
            creditor_name: Some("Inkasso Krüger".to_string()),
            sources_processed: sources,
            sources_with_amount: 1,
            disagreeing_sources: 0,
            invalid_fields: Vec::new(),
            extraction_confidence: 0.8,
            total_tokens: 0,
            methods: Vec::new(),
        }
    }

    #[test]
    fn document_type_priority() {
        let result = consolidated(vec![SourceKind::EmailBody, SourceKind::ScannedPdf]);
        assert_eq!(document_type(Some(&result)), "scanned_pdf");

        let result = consolidated(vec![
            SourceKind::EmailBody,
            SourceKind::Docx,
            SourceKind::ScannedPdf,
        ]);
        assert_eq!(document_type(Some(&result)), "scanned_pdf");

        let result = consolidated(vec![SourceKind::EmailBody]);
        assert_eq!(document_type(Some(&result)), "email_body");

        assert_eq!(document_type(None), "unknown");
    }

    #[test]
    fn single_field_correction_is_typed() {
        let corrected = serde_json::json!({"amount": "150.00"});
        let (kind, details) = correction(&corrected, Some(&consolidated(vec![])));
        assert_eq!(kind, Some(CorrectionType::Amount));
        assert_eq!(details["amount"]["before"], "120.00");
        assert_eq!(details["amount"]["after"], "150.00");
    }

    #[test]
    fn multiple_fields_collapse_to_multiple() {
        let corrected = serde_json::json!({
            "amount": "150.00",
            "client_name": "Bernd Möller",
        });
        let (kind, _) = correction(&corrected, Some(&consolidated(vec![])));
        assert_eq!(kind, Some(CorrectionType::Multiple));
    }

    #[test]
    fn empty_correction_has_no_type() {
        let (kind, _) = correction(&serde_json::json!({}), None);
        assert_eq!(kind, None);
    }
}
