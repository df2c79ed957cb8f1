//! HTML pages plus CSV and PDF exports for run results.
//!
//! Pages are plain server-rendered HTML; every value coming from a file or a backend is escaped
//! with `html-escape` before it is embedded. The PDF export uses the standard Helvetica fonts, so
//! text is reduced to Latin-1 before it is written.

use crate::processing::{FileStatus, ProgressSnapshot, RunResult};
use html_escape::{encode_double_quoted_attribute, encode_text};
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use thiserror::Error;

/// Header row of the CSV export.
pub const CSV_HEADER: [&str; 3] = ["index", "file_name", "summary"];

/// Errors raised while rendering exports.
#[derive(Debug, Error)]
pub enum RenderError {
    /// CSV writer failed.
    #[error("Failed to write CSV export: {0}")]
    Csv(#[from] csv::Error),
    /// PDF document assembly failed.
    #[error("Failed to write PDF export: {0}")]
    Pdf(#[from] lopdf::Error),
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem auto;max-width:70rem;\
padding:0 1rem;color:#1f2328}table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #d0d7de;padding:.5rem;text-align:left;vertical-align:top}\
td.summary{white-space:pre-wrap}.status-error{color:#cf222e}.status-skipped{color:#9a6700}\
.note{color:#57606a}button,.button{padding:.5rem 1rem;margin-right:.5rem}";

const POLL_SCRIPT: &str = "async function poll(){\
const response=await fetch('/process/status');const status=await response.json();\
document.getElementById('progress').textContent=\
status.completed+' / '+status.total+' files processed';\
document.getElementById('current').textContent=status.current_file?'Working on '+status.current_file:'';\
if(status.error){document.getElementById('current').textContent='Run failed: '+status.error;return;}\
if(!status.is_running){window.location='/results';return;}\
setTimeout(poll,2000);}\
async function stopRun(){await fetch('/process/stop',{method:'POST'});}\
poll();";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n\
</body>\n</html>\n",
        title = encode_text(title),
    )
}

/// Landing page with the connect link, the process button, and the last run's counts.
pub fn landing_page(
    authenticated: bool,
    progress: &ProgressSnapshot,
    last_run: Option<&RunResult>,
) -> String {
    let mut body = String::new();
    if authenticated {
        body.push_str("<p>Drive connected.</p>\n");
        if progress.is_running {
            body.push_str("<p><a class=\"button\" href=\"/processing\">View progress</a></p>\n");
        } else {
            body.push_str(
                "<form method=\"post\" action=\"/process\">\
<button type=\"submit\">Summarize my documents</button></form>\n",
            );
        }
    } else {
        body.push_str(
            "<p>Connect your Google Drive to summarize your PDF, DOCX, and TXT files.</p>\n\
<p><a class=\"button\" href=\"/auth/login\">Connect Google Drive</a></p>\n",
        );
    }

    if let Some(run) = last_run {
        body.push_str(&format!(
            "<p class=\"note\">Last run: {} of {} files processed, {} errors. \
<a href=\"/results\">View results</a></p>\n",
            run.files_processed,
            run.files_seen,
            run.count_status(FileStatus::Error)
        ));
    }
    if let Some(error) = &progress.error {
        body.push_str(&format!(
            "<p class=\"status-error\">Last run failed: {}</p>\n",
            encode_text(error)
        ));
    }

    page("Drive Digest", &body)
}

/// Progress page that polls `/process/status` and moves to the results when the run ends.
pub fn processing_page() -> String {
    let body = format!(
        "<p id=\"progress\">Starting…</p>\n<p id=\"current\" class=\"note\"></p>\n\
<p><button type=\"button\" onclick=\"stopRun()\">Stop</button></p>\n\
<p class=\"note\">Results appear here when the run finishes.</p>\n<script>{POLL_SCRIPT}</script>"
    );
    page("Processing documents", &body)
}

/// Results table with one row per processed file.
pub fn results_page(result: Option<&RunResult>) -> String {
    let Some(result) = result else {
        return page(
            "Results",
            "<p>No results yet.</p>\n<p><a href=\"/\">Back</a></p>",
        );
    };

    let mut body = String::new();
    body.push_str(&format!(
        "<p>{} of {} files processed.</p>\n",
        result.files_processed, result.files_seen
    ));
    if result.stopped {
        body.push_str("<p class=\"note\">The run was stopped before all files were processed.</p>\n");
    }
    if result.truncated {
        body.push_str("<p class=\"note\">More files exist beyond the configured limit.</p>\n");
    }
    if let Some(error) = &result.error {
        body.push_str(&format!(
            "<p class=\"status-error\">The run ended early: {}</p>\n",
            encode_text(error)
        ));
    }
    if !result.is_empty() {
        body.push_str(
            "<p><a class=\"button\" href=\"/download\">Download CSV</a>\
<a class=\"button\" href=\"/download/pdf\">Download PDF</a></p>\n",
        );
    }

    body.push_str(
        "<table>\n<thead><tr><th>#</th><th>File</th><th>Summary</th><th>Status</th></tr></thead>\n<tbody>\n",
    );
    for (index, file) in result.files.iter().enumerate() {
        body.push_str(&format!(
            "<tr><td>{}</td><td title=\"{}\">{}</td><td class=\"summary\">{}</td>\
<td class=\"status-{status}\">{status}</td></tr>\n",
            index + 1,
            encode_double_quoted_attribute(&file.id),
            encode_text(&file.name),
            encode_text(&file.summary),
            status = file.status,
        ));
    }
    body.push_str("</tbody>\n</table>\n<p><a href=\"/\">Back</a></p>");

    page("Results", &body)
}

/// Error page shown for failed requests.
pub fn error_page(title: &str, message: &str) -> String {
    let body = format!(
        "<p class=\"status-error\">{}</p>\n<p><a href=\"/\">Back</a></p>",
        encode_text(message)
    );
    page(title, &body)
}

/// CSV export of a run: header `index,file_name,summary`, one row per file, 1-based index.
pub fn results_csv(result: &RunResult) -> Result<Vec<u8>, RenderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for (index, file) in result.files.iter().enumerate() {
        writer.write_record([(index + 1).to_string(), file.name.clone(), file.summary.clone()])?;
    }
    writer
        .into_inner()
        .map_err(|error| RenderError::Csv(error.into_error().into()))
}

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 42.0;
/// Average Helvetica advance as a fraction of the font size, used for wrapping and centering.
const GLYPH_WIDTH: f32 = 0.5;

/// PDF export of a run: a title, a file count, then a numbered heading and summary per file.
pub fn results_pdf(result: &RunResult) -> Result<Vec<u8>, RenderError> {
    let mut layout = PdfLayout::new();
    layout.centered(PdfFont::Bold, 20.0, 28.0, "Document Summaries");
    layout.centered(
        PdfFont::Regular,
        11.0,
        18.0,
        &format!("{} file(s) summarized", result.files.len()),
    );
    layout.gap(24.0);

    for (index, file) in result.files.iter().enumerate() {
        layout.paragraph(PdfFont::Bold, 13.0, 20.0, &format!("{}. {}", index + 1, file.name));
        layout.paragraph(PdfFont::Regular, 10.0, 14.0, &file.summary);
        layout.gap(12.0);
    }
    layout.finish()
}

#[derive(Clone, Copy)]
enum PdfFont {
    Regular,
    Bold,
}

impl PdfFont {
    fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }
}

/// Top-down text layout that starts a new page when the cursor reaches the bottom margin.
struct PdfLayout {
    finished: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
}

impl PdfLayout {
    fn new() -> Self {
        Self {
            finished: Vec::new(),
            current: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn gap(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn advance(&mut self, height: f32) {
        if self.cursor - height < MARGIN {
            self.finished.push(std::mem::take(&mut self.current));
            self.cursor = PAGE_HEIGHT - MARGIN;
        }
        self.cursor -= height;
    }

    fn centered(&mut self, font: PdfFont, size: f32, line_height: f32, text: &str) {
        let encoded = latin1(text);
        let width = encoded.len() as f32 * size * GLYPH_WIDTH;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        self.advance(line_height);
        self.show(font, size, x, encoded);
    }

    fn paragraph(&mut self, font: PdfFont, size: f32, line_height: f32, text: &str) {
        let columns = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * GLYPH_WIDTH)) as usize;
        for line in wrap(text, columns) {
            self.advance(line_height);
            self.show(font, size, MARGIN, latin1(&line));
        }
    }

    fn show(&mut self, font: PdfFont, size: f32, x: f32, encoded: Vec<u8>) {
        if encoded.is_empty() {
            return;
        }
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![x.into(), self.cursor.into()]),
            Operation::new("Tj", vec![Object::string_literal(encoded)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn finish(mut self) -> Result<Vec<u8>, RenderError> {
        self.finished.push(self.current);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(standard_font("Helvetica"));
        let bold = doc.add_object(standard_font("Helvetica-Bold"));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => regular, "F2" => bold },
        });

        let mut kids = Vec::with_capacity(self.finished.len());
        for operations in self.finished {
            let content = Content { operations }.encode()?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::from(PAGE_WIDTH),
                    Object::from(PAGE_HEIGHT),
                ],
            });
            kids.push(Object::from(page_id));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(lopdf::Error::from)?;
        Ok(bytes)
    }
}

fn standard_font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Greedy word wrap at `columns` characters; explicit line breaks are kept and overlong words
/// are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    for source_line in text.lines() {
        let mut line = String::new();
        let mut width = 0;
        for word in source_line.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(columns) {
                if width > 0 && width + 1 + piece.len() > columns {
                    lines.push(std::mem::take(&mut line));
                    width = 0;
                }
                if width > 0 {
                    line.push(' ');
                    width += 1;
                }
                line.extend(piece);
                width += piece.len();
            }
        }
        lines.push(line);
    }
    lines
}

/// Reduce text to Latin-1 bytes, mapping common typographic characters to ASCII.
fn latin1(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' => bytes.push(b'\''),
            '\u{201c}' | '\u{201d}' => bytes.push(b'"'),
            '\u{2013}' => bytes.push(b'-'),
            '\u{2014}' => bytes.extend_from_slice(b"--"),
            '\u{2026}' => bytes.extend_from_slice(b"..."),
            '\u{2022}' => bytes.push(b'*'),
            '\u{00a0}' | '\t' => bytes.push(b' '),
            '\u{200b}' => {}
            ch if ch.is_control() => {}
            ch => bytes.push(u8::try_from(u32::from(ch)).unwrap_or(b'?')),
        }
    }
    bytes
}
