use crate::{ExtractContext, ExtractError};
use bigdecimal::BigDecimal;
use models::{
    AttachmentDescriptor, Confidence, ExtractionMethod, ExtractionResult, SourceKind,
};
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::Read;

lazy_static::lazy_static! {
    static ref AMOUNT_LABEL: regex::Regex = regex::Regex::new(
        r"(?i)\b(gesamtforderung|forderungsh(?:ö|oe)he|schulden|offener\s+betrag|restschuld|gesamtsumme|hauptforderung|gesamtbetrag)\b",
    )
    .unwrap();
}

/// Cell grid of one worksheet, keyed by (row, column), both zero-based.
type Grid = HashMap<(u32, u32), String>;

/// Parse an A1-style reference into (row, column), zero-based.
fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let mut col = 0u32;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    Some((row.checked_sub(1)?, col.checked_sub(1)?))
}

fn read_shared_strings<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ExtractError> {
    let mut xml = String::new();
    match archive.by_name("xl/sharedStrings.xml") {
        Ok(mut entry) => {
            entry
                .read_to_string(&mut xml)
                .map_err(|err| ExtractError::Unreadable(format!("xlsx strings: {err}")))?;
        }
        Err(_) => return Ok(Vec::new()),
    }

    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"si" => current.clear(),
            Ok(Event::Start(e)) if e.name().as_ref() == b"t" => in_t = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"t" => in_t = false,
            Ok(Event::End(e)) if e.name().as_ref() == b"si" => strings.push(current.clone()),
            Ok(Event::Text(t)) if in_t => {
                let decoded = t
                    .decode()
                    .map_err(|err| ExtractError::Unreadable(format!("xlsx text: {err}")))?;
                let text = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| ExtractError::Unreadable(format!("xlsx text: {err}")))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ExtractError::Unreadable(format!("xlsx xml: {err}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn read_sheet(xml: &str, shared: &[String]) -> Result<Grid, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut grid = Grid::new();

    let mut cell: Option<(u32, u32)> = None;
    let mut cell_type = Vec::new();
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"c" => {
                cell = None;
                cell_type = b"n".to_vec();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"r" => {
                            let raw = String::from_utf8_lossy(&attr.value);
                            cell = parse_cell_ref(&raw);
                        }
                        b"t" => cell_type = attr.value.to_vec(),
                        _ => {}
                    }
                }
                value.clear();
            }
            Ok(Event::Start(e)) if matches!(e.name().as_ref(), b"v" | b"t") => {
                in_value = true;
            }
            Ok(Event::End(e)) if matches!(e.name().as_ref(), b"v" | b"t") => {
                in_value = false;
            }
            Ok(Event::Text(t)) if in_value => {
                let decoded = t
                    .decode()
                    .map_err(|err| ExtractError::Unreadable(format!("xlsx text: {err}")))?;
                let text = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| ExtractError::Unreadable(format!("xlsx text: {err}")))?;
                value.push_str(&text);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"c" => {
                if let Some(coords) = cell.take() {
                    let resolved = if cell_type == b"s" {
                        value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|idx| shared.get(idx).cloned())
                            .unwrap_or_default()
                    } else {
                        value.clone()
                    };
                    if !resolved.is_empty() {
                        grid.insert(coords, resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ExtractError::Unreadable(format!("xlsx xml: {err}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(grid)
}

fn parse_cell_amount(raw: &str) -> Option<BigDecimal> {
    localize::parse_amount(raw.trim()).ok()
}

/// Scan a cell grid: for every cell matching an amount label, consult the
/// cell immediately to its right, then the one below it. The highest
/// plausible amount wins.
fn scan_grid(grid: &Grid) -> Option<BigDecimal> {
    let mut best: Option<BigDecimal> = None;
    for (&(row, col), text) in grid {
        if !AMOUNT_LABEL.is_match(text) {
            continue;
        }
        let candidate = grid
            .get(&(row, col + 1))
            .or_else(|| grid.get(&(row + 1, col)))
            .and_then(|raw| parse_cell_amount(raw));
        if let Some(amount) = candidate {
            if best.as_ref().map_or(true, |b| amount > *b) {
                best = Some(amount);
            }
        }
    }
    best
}

fn read_workbook(path: &std::path::Path) -> Result<Option<BigDecimal>, ExtractError> {
    let file =
        std::fs::File::open(path).map_err(|err| ExtractError::Unreadable(err.to_string()))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| ExtractError::Unreadable(format!("xlsx archive: {err}")))?;

    let shared = read_shared_strings(&mut archive)?;

    let sheet_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
        .map(str::to_string)
        .collect();

    let mut best: Option<BigDecimal> = None;
    for name in sheet_names {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|err| ExtractError::Unreadable(format!("xlsx sheet: {err}")))?
            .read_to_string(&mut xml)
            .map_err(|err| ExtractError::Unreadable(format!("xlsx read: {err}")))?;
        let grid = read_sheet(&xml, &shared)?;
        if let Some(amount) = scan_grid(&grid) {
            if best.as_ref().map_or(true, |b| amount > *b) {
                best = Some(amount);
            }
        }
    }
    Ok(best)
}

/// XLSX extraction: a streaming read-only pass over each worksheet, matching
/// labeled cells against their right and lower neighbors. Zero token cost.
pub async fn extract(
    ctx: &ExtractContext,
    attachment: &AttachmentDescriptor,
) -> Result<ExtractionResult, ExtractError> {
    let fetched = ctx.fetcher.fetch(attachment).await?;

    let path = fetched.path().to_path_buf();
    let amount = tokio::task::spawn_blocking(move || read_workbook(&path))
        .await
        .map_err(|err| ExtractError::Other(anyhow::anyhow!("xlsx task: {err}")))??;

    let confidence = if amount.is_some() {
        Confidence::High
    } else {
        Confidence::Low
    };
    Ok(ExtractionResult {
        source: SourceKind::Xlsx,
        source_name: attachment.filename.clone(),
        labeled_amount: amount.is_some(),
        gesamt_amount: amount,
        client_name: None,
        creditor_name: None,
        confidence,
        method: ExtractionMethod::TableScan,
        tokens_used: 0,
        error: None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn cell_references() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("B2"), Some((1, 1)));
        assert_eq!(parse_cell_ref("AA10"), Some((9, 26)));
    }

    #[test]
    fn label_cell_consults_right_then_below() {
        let mut grid = Grid::new();
        grid.insert((0, 0), "Gesamtforderung".to_string());
        grid.insert((0, 1), "1.234,56".to_string());
        assert_eq!(
            scan_grid(&grid),
            Some(BigDecimal::from_str("1234.56").unwrap())
        );

        let mut below = Grid::new();
        below.insert((2, 0), "Restschuld".to_string());
        below.insert((3, 0), "890,00".to_string());
        assert_eq!(
            scan_grid(&below),
            Some(BigDecimal::from_str("890.00").unwrap())
        );
    }

    #[test]
    fn highest_amount_wins_across_labels() {
        let mut grid = Grid::new();
        grid.insert((0, 0), "Hauptforderung".to_string());
        grid.insert((0, 1), "100,00".to_string());
        grid.insert((1, 0), "Gesamtsumme".to_string());
        grid.insert((1, 1), "175,00".to_string());
        assert_eq!(
            scan_grid(&grid),
            Some(BigDecimal::from_str("175.00").unwrap())
        );
    }

    #[test]
    fn sheet_xml_parses_shared_and_inline_values() {
        let shared = vec!["Gesamtforderung".to_string()];
        let xml = r#"<?xml version="1.0"?>
            <worksheet>
              <sheetData>
                <row r="1">
                  <c r="A1" t="s"><v>0</v></c>
                  <c r="B1"><v>1499.50</v></c>
                </row>
              </sheetData>
            </worksheet>"#;
        let grid = read_sheet(xml, &shared).unwrap();
        assert_eq!(grid.get(&(0, 0)).unwrap(), "Gesamtforderung");
        assert_eq!(
            scan_grid(&grid),
            Some(BigDecimal::from_str("1499.50").unwrap())
        );
    }
}
