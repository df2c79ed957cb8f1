//! DOCX text extraction from the `word/document.xml` part.

use super::ExtractionError;
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

/// Matches text runs (`<w:t>…</w:t>`) and inline breaks (`<w:tab/>`, `<w:br/>`, `<w:cr/>`).
fn run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(?:tab|br|cr)\b[^>]*/>")
            .expect("docx run pattern compiles")
    })
}

/// Read the main document part and return its paragraphs separated by blank lines.
pub(super) fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractionError::Docx(format!("not a zip container: {error}")))?;
    let mut entry = archive
        .by_name(DOCUMENT_PART)
        .map_err(|error| ExtractionError::Docx(format!("missing {DOCUMENT_PART}: {error}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|error| ExtractionError::Docx(format!("unreadable {DOCUMENT_PART}: {error}")))?;

    let pattern = run_pattern();
    let mut paragraphs = Vec::new();
    for block in xml.split("</w:p>") {
        let mut paragraph = String::new();
        for captures in pattern.captures_iter(block) {
            match captures.get(1) {
                Some(text) => paragraph.push_str(&html_escape::decode_html_entities(text.as_str())),
                None => paragraph.push(' '),
            }
        }
        if !paragraph.trim().is_empty() {
            paragraphs.push(paragraph);
        }
    }

    Ok(paragraphs.join("\n\n"))
}
