//! Core data types and error definitions for the processing pipeline.

use crate::{
    auth::AuthError,
    drive::{DocumentFormat, RemoteFile, SourceError},
    extract::ExtractionError,
    summarization::SummarizationClientError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Summary recorded for files whose extraction produced no text.
pub const NO_TEXT_PLACEHOLDER: &str = "No extractable text";

/// Errors produced while splitting text into bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Summarizer configured with an impossible per-call threshold.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the requested encoding.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
    /// The blocking chunking task panicked or was cancelled.
    #[error("chunking task failed: {0}")]
    Task(String),
}

/// Errors produced while summarizing one document.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Text could not be split into chunks.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The single or final backend call failed.
    #[error("{source}")]
    Backend {
        /// Backend calls issued before and including the failing one.
        calls: usize,
        /// Chunk calls that had already failed when the final call failed.
        failed_chunks: usize,
        /// Error reported by the backend client.
        #[source]
        source: SummarizationClientError,
    },
}

impl SummarizeError {
    /// Backend calls issued before the failure.
    pub fn backend_calls(&self) -> usize {
        match self {
            Self::Chunking(_) => 0,
            Self::Backend { calls, .. } => *calls,
        }
    }

    /// Chunk calls that failed before the error.
    pub fn failed_chunks(&self) -> usize {
        match self {
            Self::Chunking(_) => 0,
            Self::Backend { failed_chunks, .. } => *failed_chunks,
        }
    }
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Credential missing, expired, or rejected before any file was processed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Listing the remote files failed.
    #[error("Failed to list files: {0}")]
    Listing(#[source] SourceError),
    /// Downloading one file failed.
    #[error("Download failed: {0}")]
    Download(#[source] SourceError),
    /// Text extraction rejected the file content.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Text extraction exceeded the per-operation timeout.
    #[error("Text extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),
    /// Blocking extraction task failed to complete.
    #[error("Text extraction task failed: {0}")]
    ExtractionTask(String),
    /// Summarization failed for the file.
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    /// Another run is still in progress.
    #[error("A processing run is already in progress")]
    AlreadyRunning,
}

/// Terminal status of one processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// A summary was produced.
    Ok,
    /// Extraction produced no text; nothing was sent to the backend.
    Skipped,
    /// Download, extraction, or the final backend call failed.
    Error,
}

impl FileStatus {
    /// Lowercase label used in tables and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of summarizing one document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutcome {
    /// Final summary text.
    pub summary: String,
    /// Backend calls issued, including chunk and final calls.
    pub backend_calls: usize,
    /// Chunk calls that failed and were replaced by placeholders.
    pub failed_chunks: usize,
}

impl SummaryOutcome {
    /// Whether the text was empty and no backend call was made.
    pub fn is_placeholder(&self) -> bool {
        self.backend_calls == 0 && self.summary == NO_TEXT_PLACEHOLDER
    }
}

/// One row of a run's results.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    /// Opaque identifier from the file source.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Detected format.
    pub format: DocumentFormat,
    /// Normalized extracted text; empty when extraction failed or found nothing.
    pub extracted_text: String,
    /// Summary, or an error placeholder.
    pub summary: String,
    /// Terminal status.
    pub status: FileStatus,
    /// Backend calls issued for this file.
    pub backend_calls: usize,
    /// Chunk calls that failed for this file.
    pub failed_chunks: usize,
}

impl ProcessedFile {
    /// Row for a file whose text went through the summarizer.
    pub fn summarized(file: &RemoteFile, extracted_text: String, outcome: SummaryOutcome) -> Self {
        let status = if outcome.is_placeholder() {
            FileStatus::Skipped
        } else {
            FileStatus::Ok
        };
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            format: file.format,
            extracted_text,
            summary: outcome.summary,
            status,
            backend_calls: outcome.backend_calls,
            failed_chunks: outcome.failed_chunks,
        }
    }

    /// Row for a file that failed at download, extraction, or the final backend call.
    pub fn failed(file: &RemoteFile, extracted_text: String, error: &ProcessingError) -> Self {
        let (backend_calls, failed_chunks) = match error {
            ProcessingError::Summarize(inner) => (inner.backend_calls(), inner.failed_chunks()),
            _ => (0, 0),
        };
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            format: file.format,
            extracted_text,
            summary: format!("Error: {error}"),
            status: FileStatus::Error,
            backend_calls,
            failed_chunks,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    /// Processed files in listing order.
    pub files: Vec<ProcessedFile>,
    /// Supported files returned by the listing (bounded by the cap).
    pub files_seen: usize,
    /// Files that reached a terminal status.
    pub files_processed: usize,
    /// Listing hit the cap while more supported files existed.
    pub truncated: bool,
    /// Run halted early by a stop request.
    pub stopped: bool,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// RFC 3339 finish timestamp.
    pub finished_at: String,
    /// Failure that ended the run before any file was processed.
    pub error: Option<String>,
}

impl RunResult {
    /// Whether the run produced any rows.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of rows with the given status.
    pub fn count_status(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|file| file.status == status).count()
    }
}
