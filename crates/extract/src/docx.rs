use crate::{ExtractContext, ExtractError};
use localize::{extract_amount, preprocess};
use models::{
    AttachmentDescriptor, Confidence, ExtractionMethod, ExtractionResult, SourceKind,
};
use quick_xml::events::Event;
use std::io::Read;

/// Pull the visible text out of `word/document.xml`: paragraph and table
/// cell runs, with paragraph breaks preserved as newlines.
fn read_docx_text(path: &std::path::Path) -> Result<String, ExtractError> {
    let file =
        std::fs::File::open(path).map_err(|err| ExtractError::Unreadable(err.to_string()))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| ExtractError::Unreadable(format!("docx archive: {err}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| ExtractError::Unreadable(format!("docx structure: {err}")))?
        .read_to_string(&mut xml)
        .map_err(|err| ExtractError::Unreadable(format!("docx read: {err}")))?;

    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                b"w:tc" => out.push(' '),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:tab" || e.name().as_ref() == b"w:br" => {
                out.push(' ');
            }
            Ok(Event::Text(t)) if in_text => {
                let decoded = t
                    .decode()
                    .map_err(|err| ExtractError::Unreadable(format!("docx text: {err}")))?;
                let text = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| ExtractError::Unreadable(format!("docx text: {err}")))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ExtractError::Unreadable(format!("docx xml: {err}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// DOCX extraction: paragraphs and table cells through the body rules.
/// Zero token cost.
pub async fn extract(
    ctx: &ExtractContext,
    attachment: &AttachmentDescriptor,
) -> Result<ExtractionResult, ExtractError> {
    let fetched = ctx.fetcher.fetch(attachment).await?;

    let path = fetched.path().to_path_buf();
    let text = tokio::task::spawn_blocking(move || read_docx_text(&path))
        .await
        .map_err(|err| ExtractError::Other(anyhow::anyhow!("docx task: {err}")))??;

    let prepared = preprocess(&text);
    let found = extract_amount(&prepared.text);
    let (amount, labeled, confidence) = match found {
        Some(found) if found.labeled => (Some(found.amount), true, Confidence::High),
        Some(found) => (Some(found.amount), false, Confidence::Medium),
        None => (None, false, Confidence::Low),
    };
    let (client_name, creditor_name) = crate::body::labeled_parties(&prepared.text);

    Ok(ExtractionResult {
        source: SourceKind::Docx,
        source_name: attachment.filename.clone(),
        gesamt_amount: amount,
        labeled_amount: labeled,
        client_name,
        creditor_name,
        confidence,
        method: ExtractionMethod::NativeText,
        tokens_used: 0,
        error: None,
    })
}
