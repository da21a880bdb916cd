//! The narrow LLM vendor interface the pipeline consumes: a blind
//! JSON-producing completion call that reports token usage, with errors
//! classified into the retry taxonomy.

mod client;
mod cost;
mod stub;
mod types;

pub use client::{ClientConfig, HttpLlmClient, LlmClient};
pub use cost::{estimate_cost_usd, estimate_tokens, ModelCosts};
pub use stub::ScriptedClient;
pub use types::{CompletionRequest, CompletionResponse, ImagePayload, Usage};

/// Vendor errors, classified for the dispatcher's retry predicate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vendor rate limit")]
    RateLimit,
    #[error("vendor call timed out")]
    Timeout,
    #[error("connection to vendor failed: {0}")]
    Connection(String),
    #[error("vendor rejected the request: {0}")]
    BadRequest(String),
    #[error("vendor error: {0}")]
    Unknown(String),
}

impl Error {
    /// Rate limits, timeouts and connection failures are worth retrying;
    /// a rejected request never is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RateLimit | Error::Timeout | Error::Connection(_)
        )
    }
}
