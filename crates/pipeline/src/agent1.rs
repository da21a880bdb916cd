use bigdecimal::{BigDecimal, FromPrimitive};
use chrono::Utc;
use extract::{ExtractContext, ExtractError, TokenBudget};
use ingest_sql::jobs::{self, JobRow};
use ingest_sql::metrics::CallMetric;
use llm::{estimate_cost_usd, estimate_tokens, CompletionRequest};
use models::{
    Agent1Checkpoint, CheckpointStatus, ErrorKind, InboundEmail, Intent, ProcessingError,
    PromptTaskType, AGENT1_KEY,
};
use serde::Deserialize;

/// Confidence below which downstream stages refuse to act on the intent.
pub const INTENT_GATE: f64 = 0.7;

const BODY_TRUNCATION: usize = 4000;

lazy_static::lazy_static! {
    static ref OUT_OF_OFFICE: regex::Regex = regex::Regex::new(
        r"(?i)\b(out of office|automatic reply|auto.?reply|abwesenheitsnotiz|abwesend|automatische antwort|nicht im (büro|buero|haus))\b",
    )
    .unwrap();

    static ref NO_REPLY: regex::Regex = regex::Regex::new(r"(?i)^no[-._]?reply").unwrap();
}

/// The rule-based fast path: standard automation headers, out-of-office
/// subjects, and no-reply senders classify without any token cost. Returns
/// `None` for ambiguous messages, which fall through to the model.
pub fn rule_based_intent(email: &InboundEmail) -> Option<Intent> {
    if let Some(value) = email.header("Auto-Submitted") {
        if !value.trim().eq_ignore_ascii_case("no") {
            return Some(Intent::AutoReply);
        }
    }
    if let Some(value) = email.header("X-Auto-Response-Suppress") {
        let has_marker = value
            .split(',')
            .map(str::trim)
            .any(|token| {
                token.eq_ignore_ascii_case("DR")
                    || token.eq_ignore_ascii_case("AutoReply")
                    || token.eq_ignore_ascii_case("All")
            });
        if has_marker {
            return Some(Intent::AutoReply);
        }
    }
    if OUT_OF_OFFICE.is_match(&email.subject) {
        return Some(Intent::AutoReply);
    }
    if NO_REPLY.is_match(email.sender_local_part()) {
        return Some(Intent::Spam);
    }
    None
}

#[derive(Debug, Deserialize)]
struct WireIntent {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    confidence: f64,
}

fn parse_intent(content: &str) -> (Intent, f64) {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let Ok(wire) = serde_json::from_str::<WireIntent>(trimmed) else {
        // Ambiguous output defaults to debt_statement below the gate, so
        // downstream confidence flags it.
        return (Intent::DebtStatement, 0.5);
    };
    let intent = match wire.intent.as_str() {
        "debt_statement" => Intent::DebtStatement,
        "payment_plan" => Intent::PaymentPlan,
        "rejection" => Intent::Rejection,
        "inquiry" => Intent::Inquiry,
        "auto_reply" => Intent::AutoReply,
        "spam" => Intent::Spam,
        _ => return (Intent::DebtStatement, wire.confidence.min(0.5)),
    };
    (intent, wire.confidence.clamp(0.0, 1.0))
}

fn checkpoint(intent: Intent, confidence: f64, rule_based: bool, tokens: u64) -> Agent1Checkpoint {
    Agent1Checkpoint {
        status: if confidence < INTENT_GATE {
            CheckpointStatus::NeedsReview
        } else {
            CheckpointStatus::Passed
        },
        intent,
        confidence,
        rule_based,
        skip_extraction: intent.skips_extraction(),
        tokens_used: tokens,
        completed_at: Utc::now(),
    }
}

/// The model fallback, under the same budget discipline as the extractors:
/// token budget and daily breaker checked first, estimated cost recorded
/// before the call, settled and metered afterwards.
async fn classify_with_model(
    ctx: &ExtractContext,
    job: &JobRow,
    email: &InboundEmail,
    budget: &TokenBudget,
) -> Result<Agent1Checkpoint, ExtractError> {
    let mut body = email.body_text.clone();
    body.truncate(body.char_indices().nth(BODY_TRUNCATION).map_or(body.len(), |(i, _)| i));

    let prompt = ctx
        .registry
        .resolve(
            PromptTaskType::Classification,
            "intent",
            &serde_json::json!({
                "subject": email.subject,
                "sender": email.from_email,
                "body": body,
            }),
        )
        .await
        .map_err(|err| ExtractError::Other(anyhow::anyhow!(err)))?;

    let estimated_in = estimate_tokens(&prompt.user_text);
    let max_out = prompt.max_tokens.max(0) as u64;
    budget.check(estimated_in + max_out)?;
    ctx.breaker.check().await?;
    let estimated_usd = estimate_cost_usd(&ctx.costs, estimated_in, max_out);
    ctx.breaker.pre_record(estimated_usd).await?;

    let mut request = CompletionRequest::new(&prompt.model_name, &prompt.user_text)
        .with_temperature(prompt.temperature)
        .with_max_tokens(prompt.max_tokens.max(0) as u32);
    if let Some(system) = prompt.system.clone() {
        request = request.with_system(system);
    }

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
        job_id: Some(job.id),
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
    let (intent, confidence) = parse_intent(&response.content);
    Ok(checkpoint(intent, confidence, false, response.usage.total()))
}

/// Agent 1: classify the message intent. Idempotent on retry through the
/// stored checkpoint; the rule fast path costs nothing.
#[tracing::instrument(skip_all, fields(job_id = %job.id))]
pub async fn run(
    ctx: &ExtractContext,
    pool: &sqlx::PgPool,
    job: &JobRow,
    budget: &TokenBudget,
) -> Result<Agent1Checkpoint, ProcessingError> {
    if let Some(existing) = job.agent_checkpoints.0.get(AGENT1_KEY) {
        if let Ok(parsed) = serde_json::from_value::<Agent1Checkpoint>(existing.clone()) {
            tracing::debug!("reusing intent checkpoint");
            return Ok(parsed);
        }
    }

    let email = job.inbound_email();
    let result = match rule_based_intent(&email) {
        Some(intent) => checkpoint(intent, 1.0, true, 0),
        None => match classify_with_model(ctx, job, &email, budget).await {
            Ok(result) => result,
            Err(err) if err.is_business() => {
                tracing::warn!(%err, "classification budget refused, defaulting to review");
                checkpoint(Intent::DebtStatement, 0.5, false, 0)
            }
            Err(ExtractError::Vendor(vendor)) if vendor.is_transient() => {
                return Err(
                    ProcessingError::new(ErrorKind::Transient, vendor.to_string())
                        .with_source(anyhow::anyhow!(vendor)),
                );
            }
            Err(err) => {
                return Err(
                    ProcessingError::new(ErrorKind::Permanent, err.to_string())
                        .with_source(anyhow::anyhow!(err)),
                );
            }
        },
    };

    let value = serde_json::to_value(&result)
        .map_err(|err| ProcessingError::permanent(format!("encoding checkpoint: {err}")))?;
    jobs::record_checkpoint(pool, job.id, AGENT1_KEY, &value)
        .await
        .map_err(ProcessingError::from)?;
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    fn email() -> InboundEmail {
        InboundEmail {
            ticket_id: "T-1".to_string(),
            webhook_id: "wh-1".to_string(),
            from_email: "buero@inkasso-krueger.de".to_string(),
            subject: "Forderungsaufstellung".to_string(),
            body_text: "Die Gesamtforderung beträgt 1.234,56 EUR".to_string(),
            body_html: String::new(),
            headers: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn auto_submitted_header_is_an_auto_reply() {
        let mut mail = email();
        mail.headers
            .insert("Auto-Submitted".to_string(), "auto-replied".to_string());
        assert_eq!(rule_based_intent(&mail), Some(Intent::AutoReply));

        // The explicit "no" value means a human sent it.
        mail.headers
            .insert("Auto-Submitted".to_string(), "no".to_string());
        assert_eq!(rule_based_intent(&mail), None);
    }

    #[test]
    fn suppress_header_tokens() {
        let mut mail = email();
        mail.headers.insert(
            "X-Auto-Response-Suppress".to_string(),
            "OOF, AutoReply".to_string(),
        );
        assert_eq!(rule_based_intent(&mail), Some(Intent::AutoReply));
    }

    #[test]
    fn out_of_office_subjects_in_both_languages() {
        let mut mail = email();
        mail.subject = "Abwesenheitsnotiz: bis 12.08. nicht im Büro".to_string();
        assert_eq!(rule_based_intent(&mail), Some(Intent::AutoReply));

        mail.subject = "Out of Office: back next week".to_string();
        assert_eq!(rule_based_intent(&mail), Some(Intent::AutoReply));
    }

    #[test]
    fn no_reply_sender_is_spam() {
        let mut mail = email();
        mail.from_email = "no-reply@newsletter.example".to_string();
        assert_eq!(rule_based_intent(&mail), Some(Intent::Spam));
        let mut mail = email();
        mail.from_email = "noreply@shop.example".to_string();
        assert_eq!(rule_based_intent(&mail), Some(Intent::Spam));
    }

    #[test]
    fn ordinary_creditor_mail_falls_through() {
        assert_eq!(rule_based_intent(&email()), None);
    }

    #[test]
    fn wire_intent_parsing() {
        let (intent, confidence) =
            parse_intent(r#"{"intent": "rejection", "confidence": 0.92}"#);
        assert_eq!(intent, Intent::Rejection);
        assert!((confidence - 0.92).abs() < 1e-9);

        // Garbage defaults to debt_statement below the gate.
        let (intent, confidence) = parse_intent("I could not decide");
        assert_eq!(intent, Intent::DebtStatement);
        assert!(confidence < INTENT_GATE);
    }

    #[test]
    fn checkpoint_gate() {
        let passed = checkpoint(Intent::DebtStatement, 0.9, false, 10);
        assert_eq!(passed.status, CheckpointStatus::Passed);
        assert!(!passed.skip_extraction);

        let flagged = checkpoint(Intent::DebtStatement, 0.6, false, 10);
        assert_eq!(flagged.status, CheckpointStatus::NeedsReview);

        let skip = checkpoint(Intent::AutoReply, 1.0, true, 0);
        assert!(skip.skip_extraction);
    }
}
