use anyhow::Context;

/// A job update that was applied but needs a reviewer's eyes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewNotice {
    pub job_id: String,
    pub ticket_id: String,
    pub subject: String,
    pub sender: String,
    pub amount: String,
    pub overall_confidence: f64,
    pub conflicts: usize,
}

/// A job that exhausted its retries or hit a non-retryable error.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureNotice {
    pub job_id: String,
    pub ticket_id: String,
    pub subject: String,
    pub error: String,
    pub retry_count: i32,
}

#[derive(Debug)]
pub struct NotificationEmail {
    pub idempotency_key: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug)]
pub struct Renderer {
    hb: handlebars::Handlebars<'static>,
}

impl Renderer {
    pub fn try_new() -> anyhow::Result<Renderer> {
        let mut hb = handlebars::Handlebars::new();
        hb.set_strict_mode(true);

        hb.register_template_string(
            "review_subject",
            "Forderungsupdate zur Prüfung: Ticket {{ticket_id}} ({{amount}} EUR)",
        )
        .context("registering review_subject template")?;

        hb.register_template_string(
            "review_body",
            r#"<!DOCTYPE html>
<html>
<body>
  <p>Ein Forderungsupdate wurde automatisch übernommen und wartet auf
  Kontrolle.</p>
  <ul>
    <li>Ticket: <b>{{ticket_id}}</b></li>
    <li>Job: {{job_id}}</li>
    <li>Betreff: {{subject}}</li>
    <li>Absender: {{sender}}</li>
    <li>Betrag: <b>{{amount}} EUR</b></li>
    <li>Konfidenz: {{overall_confidence}}</li>
    {{#if conflicts}}<li>Konflikte: {{conflicts}}</li>{{/if}}
  </ul>
</body>
</html>"#,
        )
        .context("registering review_body template")?;

        hb.register_template_string(
            "failure_subject",
            "Verarbeitung fehlgeschlagen: Ticket {{ticket_id}} (Job {{job_id}})",
        )
        .context("registering failure_subject template")?;

        hb.register_template_string(
            "failure_body",
            r#"<!DOCTYPE html>
<html>
<body>
  <p>Die Verarbeitung einer eingehenden Gläubiger-Antwort ist endgültig
  fehlgeschlagen.</p>
  <ul>
    <li>Ticket: <b>{{ticket_id}}</b></li>
    <li>Job: {{job_id}}</li>
    <li>Betreff: {{subject}}</li>
    <li>Versuche: {{retry_count}}</li>
  </ul>
  <p>Fehler:</p>
  <pre>{{error}}</pre>
</body>
</html>"#,
        )
        .context("registering failure_body template")?;

        Ok(Renderer { hb })
    }

    pub fn render_review(
        &self,
        notice: &ReviewNotice,
        to: &str,
    ) -> anyhow::Result<NotificationEmail> {
        Ok(NotificationEmail {
            // Unique per job and stage, so a redelivered task cannot send
            // the same mail twice.
            idempotency_key: format!("review-{}", notice.job_id),
            to: to.to_string(),
            subject: self
                .hb
                .render("review_subject", notice)
                .context("rendering review subject")?,
            body: self
                .hb
                .render("review_body", notice)
                .context("rendering review body")?,
        })
    }

    pub fn render_failure(
        &self,
        notice: &FailureNotice,
        to: &str,
    ) -> anyhow::Result<NotificationEmail> {
        Ok(NotificationEmail {
            idempotency_key: format!("failure-{}-{}", notice.job_id, notice.retry_count),
            to: to.to_string(),
            subject: self
                .hb
                .render("failure_subject", notice)
                .context("rendering failure subject")?,
            body: self
                .hb
                .render("failure_body", notice)
                .context("rendering failure body")?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn review_email_renders_with_stable_idempotency_key() {
        let renderer = Renderer::try_new().unwrap();
        let notice = ReviewNotice {
            job_id: "0102030405060708".to_string(),
            ticket_id: "T-77".to_string(),
            subject: "Forderungsaufstellung".to_string(),
            sender: "buero@inkasso.example".to_string(),
            amount: "1234.56".to_string(),
            overall_confidence: 0.72,
            conflicts: 0,
        };

        let email = renderer.render_review(&notice, "review@firma.example").unwrap();
        assert_eq!(email.idempotency_key, "review-0102030405060708");
        assert_eq!(
            email.subject,
            "Forderungsupdate zur Prüfung: Ticket T-77 (1234.56 EUR)"
        );
        assert!(email.body.contains("T-77"));
        // No conflicts: the conflicts line is omitted entirely.
        assert!(!email.body.contains("Konflikte"));
    }

    #[test]
    fn failure_email_carries_the_error_chain() {
        let renderer = Renderer::try_new().unwrap();
        let notice = FailureNotice {
            job_id: "0102030405060708".to_string(),
            ticket_id: "T-8".to_string(),
            subject: "Mahnung".to_string(),
            error: "vendor rejected the request: 400".to_string(),
            retry_count: 5,
        };

        let email = renderer.render_failure(&notice, "admin@firma.example").unwrap();
        assert!(email.subject.contains("T-8"));
        assert!(email.body.contains("vendor rejected the request"));
        assert!(email.body.contains("Versuche: 5"));
    }
}
