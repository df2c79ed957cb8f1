//! Chunked map-reduce summarization over a prompt-in/text-out backend.
//!
//! Text within the threshold gets one backend call. Longer text is split into chunks, each chunk
//! is summarized in order, and the joined chunk summaries are reduced again until they fit, at
//! which point one final call produces the summary.

use crate::config::Config;
use crate::summarization::SummarizationClient;
use std::sync::Arc;

use super::chunking::{TokenCounter, build_token_counter, first_chunk, split_into_chunks};
use super::types::{ChunkingError, NO_TEXT_PLACEHOLDER, SummarizeError, SummaryOutcome};

/// Built-in prompt; `{document_text}` is required, the sentence bounds are optional.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Summarize the following document in \
{min_sentences} to {max_sentences} sentences. Cover the main topic, the key points, and any \
conclusions or decisions. Write plain prose without headings, bullet points, or preamble.\n\n\
Document:\n{document_text}";

/// Reduction rounds allowed before the intermediate text is cut to the threshold.
const MAX_REDUCTION_ROUNDS: usize = 8;

const CHUNK_SEPARATOR: &str = "\n\n";

/// Bounded-length summarizer for text of arbitrary length.
pub struct ChunkedSummarizer {
    client: Arc<dyn SummarizationClient>,
    counter: TokenCounter,
    threshold: usize,
    template: String,
    min_sentences: usize,
    max_sentences: usize,
}

impl ChunkedSummarizer {
    /// Create a summarizer with the built-in prompt and a 5–10 sentence target.
    pub fn new(
        client: Arc<dyn SummarizationClient>,
        counter: TokenCounter,
        threshold: usize,
    ) -> Result<Self, ChunkingError> {
        if threshold == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            client,
            counter,
            threshold,
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            min_sentences: 5,
            max_sentences: 10,
        })
    }

    /// Create a summarizer from the loaded configuration.
    pub fn from_config(
        client: Arc<dyn SummarizationClient>,
        config: &Config,
    ) -> Result<Self, ChunkingError> {
        let counter = build_token_counter(config.summary_chunk_unit)?;
        let mut summarizer = Self::new(client, counter, config.summary_chunk_size)?
            .with_sentence_range(config.summary_min_sentences, config.summary_max_sentences);
        if let Some(template) = &config.summary_prompt_template {
            summarizer = summarizer.with_template(template.clone());
        }
        Ok(summarizer)
    }

    /// Replace the prompt template. The template must contain `{document_text}`.
    pub fn with_template(mut self, template: String) -> Self {
        self.template = template;
        self
    }

    /// Set the target summary length in sentences.
    pub fn with_sentence_range(mut self, min_sentences: usize, max_sentences: usize) -> Self {
        self.min_sentences = min_sentences;
        self.max_sentences = max_sentences.max(min_sentences);
        self
    }

    /// Per-call threshold in the configured unit.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Summarize `text`, reducing chunk summaries until they fit a single call.
    pub async fn summarize(&self, text: &str) -> Result<SummaryOutcome, SummarizeError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SummaryOutcome {
                summary: NO_TEXT_PLACEHOLDER.to_string(),
                backend_calls: 0,
                failed_chunks: 0,
            });
        }

        let mut backend_calls = 0;
        let mut failed_chunks = 0;
        let mut current = text.to_string();
        let mut current_size = self.measure(&current);
        let mut rounds = 0;

        while current_size > self.threshold {
            if rounds == MAX_REDUCTION_ROUNDS {
                tracing::warn!(rounds, "Reduction round limit reached; truncating");
                current = self.chunk_blocking(current, first_chunk).await?;
                break;
            }
            rounds += 1;

            let chunks = self
                .chunk_blocking(current.clone(), split_into_chunks)
                .await?;
            tracing::debug!(round = rounds, chunks = chunks.len(), "Summarizing chunks");
            let mut summaries = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                backend_calls += 1;
                match self.client.complete(&self.render_prompt(chunk)).await {
                    Ok(summary) => summaries.push(summary),
                    Err(error) => {
                        failed_chunks += 1;
                        tracing::warn!(chunk = index + 1, error = %error, "Chunk summary failed");
                        summaries.push(format!(
                            "[chunk {} summary unavailable: {error}]",
                            index + 1
                        ));
                    }
                }
            }

            let next = summaries.join(CHUNK_SEPARATOR);
            let next_size = self.measure(&next);
            if next_size >= current_size {
                tracing::warn!(
                    round = rounds,
                    before = current_size,
                    after = next_size,
                    "Chunk summaries did not shrink the text; truncating"
                );
                current = self.chunk_blocking(next, first_chunk).await?;
                break;
            }
            current = next;
            current_size = next_size;
        }

        backend_calls += 1;
        let summary = self
            .client
            .complete(&self.render_prompt(&current))
            .await
            .map_err(|source| SummarizeError::Backend {
                calls: backend_calls,
                failed_chunks,
                source,
            })?;

        tracing::debug!(backend_calls, failed_chunks, rounds, "Summary produced");
        Ok(SummaryOutcome {
            summary,
            backend_calls,
            failed_chunks,
        })
    }

    /// Run a chunking step on the blocking pool; token counting is CPU-bound.
    async fn chunk_blocking<T, F>(&self, text: String, step: F) -> Result<T, ChunkingError>
    where
        T: Send + 'static,
        F: FnOnce(&str, usize, &TokenCounter) -> Result<T, ChunkingError> + Send + 'static,
    {
        let counter = self.counter.clone();
        let threshold = self.threshold;
        tokio::task::spawn_blocking(move || step(&text, threshold, &counter))
            .await
            .map_err(|error| ChunkingError::Task(error.to_string()))?
    }

    fn measure(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    fn render_prompt(&self, document_text: &str) -> String {
        // Sentence bounds are substituted first so document text is never rescanned.
        self.template
            .replace("{min_sentences}", &self.min_sentences.to_string())
            .replace("{max_sentences}", &self.max_sentences.to_string())
            .replace("{document_text}", document_text)
    }
}
