use crate::fetch::FetchedAttachment;
use crate::{ExtractContext, ExtractError, TokenBudget};
use bigdecimal::{BigDecimal, FromPrimitive};
use ingest_sql::metrics::CallMetric;
use llm::{estimate_cost_usd, estimate_tokens, CompletionRequest, ImagePayload};
use models::{
    AttachmentDescriptor, Confidence, ExtractionMethod, ExtractionResult, Id, PromptTaskType,
    SourceKind,
};
use serde::Deserialize;

/// Rough vendor-side token weight of one submitted document image.
const IMAGE_TOKEN_ESTIMATE: u64 = 1_500;

/// The JSON shape the German vision prompt asks for.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VisionFields {
    #[serde(default)]
    pub gesamtforderung: Option<String>,
    #[serde(default)]
    pub glaeubiger: Option<String>,
    #[serde(default)]
    pub schuldner: Option<String>,
    #[serde(default)]
    pub komponenten: Option<VisionComponents>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VisionComponents {
    #[serde(default)]
    pub hauptforderung: Option<String>,
    #[serde(default)]
    pub zinsen: Option<String>,
    #[serde(default)]
    pub kosten: Option<String>,
}

impl VisionFields {
    /// The total claim: the labelled Gesamtforderung, or the component sum.
    pub fn total_amount(&self) -> Option<BigDecimal> {
        if let Some(raw) = &self.gesamtforderung {
            if let Ok(amount) = localize::parse_amount(raw) {
                return Some(amount);
            }
        }
        let components = self.komponenten.as_ref()?;
        let principal = localize::parse_amount(components.hauptforderung.as_deref()?).ok()?;
        let mut total = principal;
        for part in [&components.zinsen, &components.kosten] {
            if let Some(raw) = part {
                if let Ok(amount) = localize::parse_amount(raw) {
                    total += amount;
                }
            }
        }
        Some(total)
    }
}

/// Strip a markdown code fence if the vendor wrapped its JSON in one.
fn unfence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// One budget-guarded vision call: check the token budget and the daily
/// breaker, record the estimated cost before the call, settle with actual
/// usage after it, and account the call against the prompt template.
pub(crate) async fn vision_call(
    ctx: &ExtractContext,
    job_id: Id,
    budget: &TokenBudget,
    media_type: &str,
    bytes: Vec<u8>,
    filename: &str,
) -> Result<(VisionFields, u64), ExtractError> {
    if bytes.len() as u64 > ctx.limits.vendor_max_bytes {
        return Err(ExtractError::FileTooLarge {
            size: bytes.len() as u64,
            cap: ctx.limits.vendor_max_bytes,
        });
    }

    let prompt = ctx
        .registry
        .resolve(
            PromptTaskType::Extraction,
            "vision_document",
            &serde_json::json!({ "filename": filename }),
        )
        .await
        .map_err(|err| ExtractError::Other(anyhow::anyhow!(err)))?;

    let estimated_in = estimate_tokens(&prompt.user_text) + IMAGE_TOKEN_ESTIMATE;
    let max_out = prompt.max_tokens.max(0) as u64;
    budget.check(estimated_in + max_out)?;

    ctx.breaker.check().await?;
    let estimated_usd = estimate_cost_usd(&ctx.costs, estimated_in, max_out);
    ctx.breaker.pre_record(estimated_usd).await?;

    let request = {
        let mut request = CompletionRequest::new(&prompt.model_name, &prompt.user_text)
            .with_temperature(prompt.temperature)
            .with_max_tokens(prompt.max_tokens.max(0) as u32)
            .with_image(ImagePayload {
                media_type: media_type.to_string(),
                base64_data: base64::encode(&bytes),
            });
        if let Some(system) = prompt.system.clone() {
            request = request.with_system(system);
        }
        request
    };

    let started = std::time::Instant::now();
    let outcome = ctx.llm.complete(request).await;
    let execution_ms = started.elapsed().as_millis() as i32;

    let (outcome, actual_usd) = match outcome {
        Ok(response) => {
            let actual_usd = ctx.costs.cost_usd(response.usage);
            budget.debit(response.usage.total());
            (Ok(response), actual_usd)
        }
        Err(err) => (Err(err), 0.0),
    };
    ctx.breaker.settle(estimated_usd, actual_usd).await?;

    let metric = CallMetric {
        template_id: prompt.template_id,
        job_id: Some(job_id),
        tokens_in: outcome.as_ref().map_or(0, |r| r.usage.input_tokens as i64),
        tokens_out: outcome
            .as_ref()
            .map_or(0, |r| r.usage.output_tokens as i64),
        cost_usd: BigDecimal::from_f64(actual_usd).unwrap_or_default(),
        execution_ms,
        success: outcome.is_ok(),
        overall_confidence: None,
        manual_review: false,
    };
    if let Err(err) = ingest_sql::metrics::record_call(ctx.registry.pool(), &metric).await {
        tracing::warn!(?err, "failed to record prompt call metric");
    }

    let response = outcome.map_err(ExtractError::Vendor)?;

    let tokens = response.usage.total();
    let fields: VisionFields = serde_json::from_str(unfence(&response.content))
        .map_err(|err| ExtractError::Unreadable(format!("vision response: {err}")))?;
    Ok((fields, tokens))
}

/// Vision extraction of a scanned PDF. Documents past the page budget are
/// reduced to the first five and last five pages before upload.
pub(crate) async fn extract_from_pdf(
    ctx: &ExtractContext,
    job_id: Id,
    attachment: &AttachmentDescriptor,
    fetched: &FetchedAttachment,
    total_pages: usize,
    budget: &TokenBudget,
) -> Result<ExtractionResult, ExtractError> {
    let bytes = if total_pages > ctx.limits.max_pages {
        truncate_pdf(fetched.path(), total_pages, ctx.limits.max_pages)?
    } else {
        fetched.read_bytes()?
    };

    let (fields, tokens) = vision_call(
        ctx,
        job_id,
        budget,
        "application/pdf",
        bytes,
        &attachment.filename,
    )
    .await?;

    Ok(build_result(
        SourceKind::ScannedPdf,
        &attachment.filename,
        fields,
        tokens,
        Confidence::High,
    ))
}

/// Drop the middle pages of an over-budget PDF and return the reduced bytes.
fn truncate_pdf(
    path: &std::path::Path,
    total_pages: usize,
    max_pages: usize,
) -> Result<Vec<u8>, ExtractError> {
    let mut doc = lopdf::Document::load(path)
        .map_err(|err| ExtractError::Unreadable(format!("pdf parse: {err}")))?;

    let keep = crate::pdf::select_pages(total_pages, max_pages);
    let delete: Vec<u32> = (1..=total_pages as u32)
        .filter(|page| !keep.contains(page))
        .collect();
    doc.delete_pages(&delete);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|err| ExtractError::Unreadable(format!("pdf truncation: {err}")))?;
    Ok(buffer)
}

/// Shape a vision response into the uniform extraction result. The ceiling
/// keeps image sources at MEDIUM at most.
pub(crate) fn build_result(
    source: SourceKind,
    filename: &str,
    fields: VisionFields,
    tokens: u64,
    ceiling: Confidence,
) -> ExtractionResult {
    let amount = fields.total_amount();
    let labeled = fields.gesamtforderung.is_some() && amount.is_some();

    let raw_confidence = match (&amount, &fields.glaeubiger, &fields.schuldner) {
        (Some(_), Some(_), Some(_)) => Confidence::High,
        (Some(_), _, _) => Confidence::Medium,
        _ => Confidence::Low,
    };
    let confidence = raw_confidence.cap_at(ceiling);

    ExtractionResult {
        source,
        source_name: filename.to_string(),
        gesamt_amount: amount,
        labeled_amount: labeled,
        client_name: fields.schuldner.clone(),
        creditor_name: fields.glaeubiger.clone(),
        confidence,
        method: ExtractionMethod::Vision,
        tokens_used: tokens,
        error: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn total_prefers_labeled_gesamtforderung() {
        let fields = VisionFields {
            gesamtforderung: Some("1.234,56".to_string()),
            komponenten: Some(VisionComponents {
                hauptforderung: Some("1,00".to_string()),
                zinsen: None,
                kosten: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            fields.total_amount(),
            Some(BigDecimal::from_str("1234.56").unwrap())
        );
    }

    #[test]
    fn total_sums_components_without_label() {
        let fields = VisionFields {
            komponenten: Some(VisionComponents {
                hauptforderung: Some("1.000,00".to_string()),
                zinsen: Some("50,00".to_string()),
                kosten: Some("25,00".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(
            fields.total_amount(),
            Some(BigDecimal::from_str("1075.00").unwrap())
        );
    }

    #[test]
    fn unfence_strips_markdown() {
        assert_eq!(unfence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unfence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn image_results_cap_at_medium() {
        let fields = VisionFields {
            gesamtforderung: Some("100,00".to_string()),
            glaeubiger: Some("Inkasso Krüger".to_string()),
            schuldner: Some("Max Beispiel".to_string()),
            ..Default::default()
        };
        let result = build_result(SourceKind::Image, "scan.jpg", fields, 900, Confidence::Medium);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.tokens_used, 900);
    }
}
