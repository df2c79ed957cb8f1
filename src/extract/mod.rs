//! Format-specific text extraction.
//!
//! Extraction is a pure function of the downloaded bytes and the declared format. Output is
//! normalized so that runs of whitespace collapse to single spaces while blank-line paragraph
//! breaks survive as `\n\n`; the chunker prefers those breaks as split points.

mod docx;

use crate::drive::DocumentFormat;
use thiserror::Error;

/// Errors produced while turning file bytes into plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File has no content at all.
    #[error("file is empty")]
    Empty,
    /// Format is not one of the supported document types.
    #[error("unsupported file type '{0}'")]
    Unsupported(String),
    /// PDF could not be parsed.
    #[error("failed to extract text from PDF: {0}")]
    Pdf(String),
    /// DOCX container or document part could not be read.
    #[error("failed to extract text from DOCX: {0}")]
    Docx(String),
}

/// Extract and normalize the text of a document.
///
/// Zero-byte input is rejected with [`ExtractionError::Empty`]; a parseable document that
/// simply contains no text yields an empty string.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let raw = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => docx::extract_docx(bytes)?,
        DocumentFormat::Txt => extract_txt(bytes),
    };

    let text = normalize_text(&raw);
    tracing::debug!(%format, bytes = bytes.len(), chars = text.chars().count(), "Extracted text");
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(error)) => Err(ExtractionError::Pdf(error.to_string())),
        Err(_) => Err(ExtractionError::Pdf("parser aborted on malformed input".into())),
    }
}

fn extract_txt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// Collapse whitespace inside paragraphs and keep blank-line paragraph breaks.
pub fn normalize_text(raw: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        for word in line.split_whitespace() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_byte_files_are_rejected() {
        for format in DocumentFormat::ALL {
            assert!(matches!(
                extract_text(format, b""),
                Err(ExtractionError::Empty)
            ));
        }
    }

    #[test]
    fn txt_extraction_normalizes_whitespace() {
        let raw = "\u{feff}Title   line\r\nsecond\tline\r\n\r\n\r\n  Next   paragraph  \n";
        let text = extract_text(DocumentFormat::Txt, raw.as_bytes()).expect("text");
        assert_eq!(text, "Title line second line\n\nNext paragraph");
    }

    #[test]
    fn txt_extraction_replaces_invalid_utf8() {
        let text = extract_text(DocumentFormat::Txt, b"caf\xff ok").expect("text");
        assert_eq!(text, "caf\u{fffd} ok");
    }

    #[test]
    fn whitespace_only_text_extracts_to_empty_string() {
        let text = extract_text(DocumentFormat::Txt, b" \n\t\n ").expect("text");
        assert!(text.is_empty());
    }

    /// One-page PDF showing `line` in Helvetica.
    fn single_line_pdf(line: &str) -> Vec<u8> {
        use lopdf::{
            Document, Object, Stream,
            content::{Content, Operation},
            dictionary,
        };

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[test]
    fn pdf_text_is_extracted_and_normalized() {
        let bytes = single_line_pdf("Quarterly revenue grew.");
        let text = extract_text(DocumentFormat::Pdf, &bytes).expect("text");
        assert_eq!(text, "Quarterly revenue grew.");
    }

    #[test]
    fn corrupt_pdf_is_an_extraction_error() {
        let error = extract_text(DocumentFormat::Pdf, b"definitely not a pdf").expect_err("corrupt");
        assert!(matches!(error, ExtractionError::Pdf(_)));
    }
}
