#![deny(missing_docs)]

//! Core library for Drive Digest, a web app that summarizes documents stored in Google Drive.

/// HTTP routing, session state, and page handlers.
pub mod api;
/// OAuth authorization flow and access credentials.
pub mod auth;
/// Environment-driven configuration management.
pub mod config;
/// File source abstraction and the Google Drive adapter.
pub mod drive;
/// Plain-text extraction for PDF, DOCX, and TXT files.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Chunked summarization and the processing pipeline.
pub mod processing;
/// HTML pages and CSV export.
pub mod render;
/// Summarization backend abstraction and adapters.
pub mod summarization;
