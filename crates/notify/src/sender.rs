use crate::render::NotificationEmail;
use anyhow::Context;

/// Transport seam for outgoing mail.
pub trait EmailSender: Send + Sync {
    fn send<'s>(
        &'s self,
        email: NotificationEmail,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send + 's;
}

/// Sends via the Resend API.
#[derive(Debug)]
pub struct ResendSender {
    from_address: String,
    client: resend_rs::Resend,
}

impl ResendSender {
    async fn send(&self, email: NotificationEmail) -> anyhow::Result<()> {
        let request = resend_rs::types::CreateEmailBaseOptions::new(
            &self.from_address,
            [email.to.as_str()],
            &email.subject,
        )
        .with_html(&email.body);

        let response = self
            .client
            .emails
            .send(request)
            .await
            .context("calling email API")?;
        tracing::debug!(
            to = %email.to,
            idempotency_key = %email.idempotency_key,
            email_id = ?response.id,
            "notification email sent"
        );
        Ok(())
    }
}

/// The configured transport. `Disabled` logs and skips, so a missing mail
/// configuration degrades notifications without failing jobs.
#[derive(Debug)]
pub enum Sender {
    Disabled,
    Resend(ResendSender),
}

impl Sender {
    pub fn resend(api_key: &str, from_address: String, http_client: reqwest::Client) -> Sender {
        Sender::Resend(ResendSender {
            from_address,
            client: resend_rs::Resend::with_client(api_key, http_client),
        })
    }

    /// Build from optional configuration: both pieces present enables the
    /// transport, anything missing leaves it disabled with a warning.
    pub fn from_config(
        api_key: Option<&str>,
        from_address: Option<String>,
        http_client: reqwest::Client,
    ) -> Sender {
        match (api_key, from_address) {
            (Some(key), Some(from)) => Sender::resend(key, from, http_client),
            _ => {
                tracing::warn!("email transport not configured, notifications disabled");
                Sender::Disabled
            }
        }
    }
}

impl EmailSender for Sender {
    async fn send<'s>(&'s self, email: NotificationEmail) -> anyhow::Result<()> {
        match self {
            Sender::Disabled => {
                tracing::warn!(
                    to = %email.to,
                    subject = %email.subject,
                    idempotency_key = %email.idempotency_key,
                    "skipping notification email (transport disabled)"
                );
                Ok(())
            }
            Sender::Resend(resend) => resend.send(email).await,
        }
    }
}
