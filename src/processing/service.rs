//! Processing service coordinating listing, download, extraction, and summarization.

use crate::{
    auth::{AuthError, Credential},
    config::Config,
    drive::{DocumentFormat, FileSource, RemoteFile},
    extract::extract_text,
    processing::{
        progress::RunProgress,
        summarize::ChunkedSummarizer,
        types::{FileStatus, ProcessedFile, ProcessingError, RunResult},
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Runs the pipeline for one authorized session: list, then download, extract, and summarize
/// each file in listing order.
///
/// Files are processed strictly one at a time. A failure on one file is recorded on that file's
/// row and the run moves on. An authorization failure at listing time is returned as an error;
/// any other listing failure ends the run with an empty result carrying the error.
pub struct ProcessingService {
    source: Arc<dyn FileSource>,
    summarizer: Arc<ChunkedSummarizer>,
    max_files: usize,
    timeout: Duration,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Execute one run, publishing progress as files complete.
    async fn run(
        &self,
        credential: Credential,
        progress: Arc<RunProgress>,
    ) -> Result<RunResult, ProcessingError>;
}

impl ProcessingService {
    /// Build a service over explicit collaborators.
    pub fn new(
        source: Arc<dyn FileSource>,
        summarizer: Arc<ChunkedSummarizer>,
        max_files: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            summarizer,
            max_files,
            timeout,
        }
    }

    /// Build a service using the cap and timeout from configuration.
    pub fn from_config(
        source: Arc<dyn FileSource>,
        summarizer: Arc<ChunkedSummarizer>,
        config: &Config,
    ) -> Self {
        Self::new(
            source,
            summarizer,
            config.max_files_cap,
            config.request_timeout(),
        )
    }

    /// Download, extract, and summarize a single file into its result row.
    pub async fn process_file(&self, credential: &Credential, file: &RemoteFile) -> ProcessedFile {
        let bytes = match self.source.download(credential, file).await {
            Ok(bytes) => bytes,
            Err(error) => {
                return ProcessedFile::failed(file, String::new(), &ProcessingError::Download(error));
            }
        };

        let text = match self.extract(file.format, bytes).await {
            Ok(text) => text,
            Err(error) => return ProcessedFile::failed(file, String::new(), &error),
        };

        match self.summarizer.summarize(&text).await {
            Ok(outcome) => ProcessedFile::summarized(file, text, outcome),
            Err(error) => ProcessedFile::failed(file, text, &ProcessingError::from(error)),
        }
    }

    async fn extract(
        &self,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Result<String, ProcessingError> {
        blocking_with_timeout(self.timeout, move || extract_text(format, &bytes))
            .await?
            .map_err(ProcessingError::from)
    }
}

/// Run CPU-bound extraction work on the blocking pool, bounded by `timeout`.
async fn blocking_with_timeout<T, F>(timeout: Duration, work: F) -> Result<T, ProcessingError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(ProcessingError::ExtractionTimeout(timeout)),
        Ok(Err(join_error)) => Err(ProcessingError::ExtractionTask(join_error.to_string())),
        Ok(Ok(value)) => Ok(value),
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn run(
        &self,
        credential: Credential,
        progress: Arc<RunProgress>,
    ) -> Result<RunResult, ProcessingError> {
        if !credential.is_valid() {
            return Err(AuthError::Expired.into());
        }

        let started_at = now_rfc3339();
        tracing::info!(cap = self.max_files, "Starting processing run");
        let mut listing = match self.source.list(&credential, self.max_files).await {
            Ok(listing) => listing,
            Err(error) if error.is_unauthorized() => return Err(AuthError::Expired.into()),
            Err(error) => {
                let error = ProcessingError::Listing(error);
                tracing::error!(error = %error, "Listing failed; ending run");
                return Ok(RunResult {
                    started_at,
                    finished_at: now_rfc3339(),
                    error: Some(error.to_string()),
                    ..RunResult::default()
                });
            }
        };
        listing.files.truncate(self.max_files);
        progress.set_total(listing.files.len());

        let mut result = RunResult {
            files_seen: listing.files.len(),
            truncated: listing.truncated,
            started_at,
            ..RunResult::default()
        };

        for file in &listing.files {
            if progress.stop_requested() {
                tracing::info!(
                    processed = result.files.len(),
                    remaining = listing.files.len() - result.files.len(),
                    "Stop requested; ending run"
                );
                result.stopped = true;
                break;
            }

            progress.start_file(&file.name);
            let row = self.process_file(&credential, file).await;
            match row.status {
                FileStatus::Error => tracing::warn!(
                    file_id = %row.id,
                    file = %row.name,
                    calls = row.backend_calls,
                    summary = %row.summary,
                    "File failed"
                ),
                status => tracing::info!(
                    file_id = %row.id,
                    file = %row.name,
                    %status,
                    calls = row.backend_calls,
                    failed_chunks = row.failed_chunks,
                    "File processed"
                ),
            }
            result.files.push(row);
            progress.finish_file();
        }

        result.files_processed = result.files.len();
        result.finished_at = now_rfc3339();
        tracing::info!(
            processed = result.files_processed,
            errors = result.count_status(FileStatus::Error),
            skipped = result.count_status(FileStatus::Skipped),
            stopped = result.stopped,
            truncated = result.truncated,
            "Processing run finished"
        );
        Ok(result)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
