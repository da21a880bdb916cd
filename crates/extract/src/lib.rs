//! Per-source extractors producing the uniform `ExtractionResult` shape.
//! Extractors never fail the job for a single bad attachment: unreadable,
//! oversized or over-budget sources come back as skipped results carrying
//! the cause, and the job keeps its partial results.

mod body;
mod budget;
mod docx;
mod fetch;
mod image_ext;
mod pdf;
mod scanned;
mod sources;
mod xlsx;

pub use body::extract_body;
pub use budget::{DailyCostBreaker, TokenBudget};
pub use fetch::{AttachmentFetcher, FetchedAttachment};
pub use sources::classify_attachment;

use models::{AttachmentDescriptor, ExtractionResult, Id, SourceKind};
use std::sync::Arc;

/// Extraction-layer errors. Budget, daily-limit and file-too-large are
/// business errors (non-retryable, the job continues with partial results);
/// vendor errors keep their own transience.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("token budget exceeded")]
    BudgetExceeded,
    #[error("daily cost limit reached")]
    DailyLimitExceeded,
    #[error("file too large: {size} bytes exceeds cap of {cap}")]
    FileTooLarge { size: u64, cap: u64 },
    #[error("unreadable document: {0}")]
    Unreadable(String),
    #[error("attachment fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Vendor(#[from] llm::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExtractError {
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            ExtractError::BudgetExceeded
                | ExtractError::DailyLimitExceeded
                | ExtractError::FileTooLarge { .. }
        )
    }
}

/// Limits governing document handling.
#[derive(Debug, Clone)]
pub struct ExtractLimits {
    /// Vendor cap on a single uploaded document.
    pub vendor_max_bytes: u64,
    /// Page budget before first-5 + last-5 truncation.
    pub max_pages: usize,
    /// Images above this size are resized before upload.
    pub image_resize_threshold_bytes: u64,
    /// Longest edge after image resize.
    pub image_max_edge: u32,
    /// Extracted-text-to-filesize ratio below which a PDF counts as scanned.
    pub scanned_ratio: f64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            vendor_max_bytes: 20 * 1024 * 1024,
            max_pages: 10,
            image_resize_threshold_bytes: 4 * 1024 * 1024,
            image_max_edge: 1500,
            scanned_ratio: 0.01,
        }
    }
}

/// Shared dependencies of the attachment extractors.
pub struct ExtractContext {
    pub llm: Arc<dyn llm::LlmClient>,
    pub registry: Arc<prompts::Registry>,
    pub breaker: DailyCostBreaker,
    pub fetcher: AttachmentFetcher,
    pub costs: llm::ModelCosts,
    pub limits: ExtractLimits,
}

/// Run the right extractor for one attachment. All failure modes fold into
/// a skipped result; only the temp file lifetime is owned here.
#[tracing::instrument(skip(ctx, budget), fields(filename = %attachment.filename))]
pub async fn extract_attachment(
    ctx: &ExtractContext,
    job_id: Id,
    attachment: &AttachmentDescriptor,
    budget: &TokenBudget,
) -> ExtractionResult {
    let kind = classify_attachment(attachment);
    let outcome = match kind {
        SourceKind::NativePdf => pdf::extract(ctx, job_id, attachment, budget).await,
        SourceKind::Docx => docx::extract(ctx, attachment).await,
        SourceKind::Xlsx => xlsx::extract(ctx, attachment).await,
        SourceKind::Image => image_ext::extract(ctx, job_id, attachment, budget).await,
        SourceKind::Unknown => Err(ExtractError::Unreadable(format!(
            "unsupported content type {}",
            attachment.content_type
        ))),
        // Scanned PDFs are detected inside the PDF extractor, not by type.
        SourceKind::ScannedPdf | SourceKind::EmailBody => unreachable!(),
    };

    match outcome {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(?err, filename = %attachment.filename, "attachment skipped");
            ExtractionResult::skipped(kind, attachment.filename.clone(), err.to_string())
        }
    }
}
