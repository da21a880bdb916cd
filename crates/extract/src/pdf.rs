use crate::{scanned, ExtractContext, ExtractError, TokenBudget};
use localize::{extract_amount, preprocess};
use models::{
    AttachmentDescriptor, Confidence, ExtractionMethod, ExtractionResult, Id, SourceKind,
};

/// Pages submitted for an over-budget document: the first five and the last
/// five, since claim totals sit at the head or the foot of German dunning
/// letters.
pub(crate) fn select_pages(total: usize, max_pages: usize) -> Vec<u32> {
    if total <= max_pages {
        return (1..=total as u32).collect();
    }
    let mut pages: Vec<u32> = (1..=5).collect();
    pages.extend((total as u32 - 4)..=(total as u32));
    pages
}

struct ParsedPdf {
    text: String,
    total_pages: usize,
}

fn parse_native(path: &std::path::Path, max_pages: usize) -> Result<ParsedPdf, ExtractError> {
    let doc = lopdf::Document::load(path)
        .map_err(|err| ExtractError::Unreadable(format!("pdf parse: {err}")))?;
    if doc.is_encrypted() {
        return Err(ExtractError::Unreadable("encrypted pdf".to_string()));
    }

    let total_pages = doc.get_pages().len();
    let pages = select_pages(total_pages, max_pages);
    let mut text = String::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(err) => {
                tracing::debug!(page, ?err, "skipping unextractable pdf page");
            }
        }
    }

    Ok(ParsedPdf { text, total_pages })
}

lazy_static::lazy_static! {
    static ref TABULAR_ROW: regex::Regex = regex::Regex::new(
        r"(?im)^\s*\S.*\s{2,}[0-9][0-9.,]*\s*(?:eur|€)?\s*$",
    )
    .unwrap();
}

/// Native PDF extraction. Detects scanned documents by the
/// extracted-text-to-filesize ratio and reroutes them to the vision
/// extractor; digital documents are read page by page with the body rules
/// plus a tabular-row scan.
pub async fn extract(
    ctx: &ExtractContext,
    job_id: Id,
    attachment: &AttachmentDescriptor,
    budget: &TokenBudget,
) -> Result<ExtractionResult, ExtractError> {
    let fetched = ctx.fetcher.fetch(attachment).await?;

    let path = fetched.path().to_path_buf();
    let max_pages = ctx.limits.max_pages;
    let parsed =
        tokio::task::spawn_blocking(move || parse_native(&path, max_pages))
            .await
            .map_err(|err| ExtractError::Other(anyhow::anyhow!("pdf task: {err}")))??;

    let ratio = parsed.text.len() as f64 / (fetched.size.max(1)) as f64;
    if ratio < ctx.limits.scanned_ratio {
        tracing::debug!(ratio, "pdf classified as scanned, rerouting to vision");
        return scanned::extract_from_pdf(
            ctx,
            job_id,
            attachment,
            &fetched,
            parsed.total_pages,
            budget,
        )
        .await;
    }

    let prepared = preprocess(&parsed.text);
    let found = extract_amount(&prepared.text);
    let tabular = TABULAR_ROW.is_match(&prepared.text);

    let (amount, labeled, confidence) = match found {
        Some(found) if found.labeled => (Some(found.amount), true, Confidence::High),
        Some(found) => (Some(found.amount), false, Confidence::Medium),
        None => (None, false, Confidence::Low),
    };
    let (client_name, creditor_name) = crate::body::labeled_parties(&prepared.text);

    Ok(ExtractionResult {
        source: SourceKind::NativePdf,
        source_name: attachment.filename.clone(),
        gesamt_amount: amount,
        labeled_amount: labeled,
        client_name,
        creditor_name,
        confidence,
        method: if tabular {
            ExtractionMethod::TableScan
        } else {
            ExtractionMethod::NativeText
        },
        tokens_used: 0,
        error: None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_documents_keep_all_pages() {
        assert_eq!(select_pages(3, 10), vec![1, 2, 3]);
        assert_eq!(select_pages(10, 10), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn long_documents_truncate_to_first_and_last_five() {
        assert_eq!(
            select_pages(12, 10),
            vec![1, 2, 3, 4, 5, 8, 9, 10, 11, 12]
        );
        assert_eq!(
            select_pages(40, 10),
            vec![1, 2, 3, 4, 5, 36, 37, 38, 39, 40]
        );
    }
}
