//! Outbound email notifications: the review-audience note for medium-
//! confidence updates and the admin note for permanently failed jobs.
//! Rendering is template-based; transport sits behind `EmailSender` with a
//! `Disabled` fallback that logs and skips when no credentials are
//! configured.

mod render;
mod sender;

pub use render::{FailureNotice, NotificationEmail, Renderer, ReviewNotice};
pub use sender::{EmailSender, Sender};

/// Renders and sends pipeline notifications.
pub struct Notifier {
    renderer: Renderer,
    sender: Sender,
    review_address: Option<String>,
    admin_address: Option<String>,
}

impl Notifier {
    pub fn new(
        sender: Sender,
        review_address: Option<String>,
        admin_address: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            renderer: Renderer::try_new()?,
            sender,
            review_address,
            admin_address,
        })
    }

    /// Medium-confidence updates write and then notify the review audience.
    pub async fn notify_review(&self, notice: &ReviewNotice) -> anyhow::Result<()> {
        let Some(address) = &self.review_address else {
            tracing::warn!(job_id = %notice.job_id, "no review address configured, skipping notification");
            return Ok(());
        };
        let email = self.renderer.render_review(notice, address)?;
        self.sender.send(email).await
    }

    /// Permanent failures notify the admin address.
    pub async fn notify_failure(&self, notice: &FailureNotice) -> anyhow::Result<()> {
        let Some(address) = &self.admin_address else {
            tracing::warn!(job_id = %notice.job_id, "no admin address configured, skipping notification");
            return Ok(());
        };
        let email = self.renderer.render_failure(notice, address)?;
        self.sender.send(email).await
    }
}
