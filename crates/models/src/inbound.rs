use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single attachment reference as delivered by the webhook provider.
/// Bytes are fetched lazily from the object store; `size` is the provider's
/// declared size and is checked before any download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub url: String,
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
}

/// The inbound email as received from the webhook edge, after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    pub ticket_id: String,
    pub webhook_id: String,
    pub from_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub body_html: String,
    /// Raw transport headers, as forwarded by the provider. Used only by the
    /// rule-based intent fast path (`Auto-Submitted`, `X-Auto-Response-Suppress`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
}

impl InboundEmail {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The local part of the sender address, lowercased.
    pub fn sender_local_part(&self) -> &str {
        self.from_email
            .split('@')
            .next()
            .unwrap_or(&self.from_email)
    }
}
