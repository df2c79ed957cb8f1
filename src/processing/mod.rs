//! Document processing pipeline: chunking, chunked summarization, and run orchestration.

pub mod chunking;
mod progress;
mod service;
pub mod summarize;
pub mod types;

pub use progress::{ProgressSnapshot, RunProgress};
pub use service::{ProcessingApi, ProcessingService};
pub use summarize::{ChunkedSummarizer, DEFAULT_PROMPT_TEMPLATE};
pub use types::{
    ChunkingError, FileStatus, NO_TEXT_PLACEHOLDER, ProcessedFile, ProcessingError, RunResult,
    SummarizeError, SummaryOutcome,
};
