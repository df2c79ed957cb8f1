//! Shared types used by the file source adapters.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while listing or downloading remote files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid file source URL: {0}")]
    InvalidUrl(String),
    /// Provider rejected the access credential.
    #[error("File source rejected the access credential ({status})")]
    Unauthorized {
        /// HTTP status returned by the provider.
        status: StatusCode,
    },
    /// Request exceeded the configured timeout.
    #[error("File source request timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected file source response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

impl SourceError {
    /// Whether the failure means the user must authorize again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Document formats the pipeline knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word processing document.
    Docx,
    /// Plain UTF-8 text.
    Txt,
}

impl DocumentFormat {
    /// Every supported format, in the order used to build provider queries.
    pub const ALL: [DocumentFormat; 3] = [Self::Pdf, Self::Docx, Self::Txt];

    /// MIME type advertised by the provider for this format.
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Txt => "text/plain",
        }
    }

    /// Lowercase file extension without the leading dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }

    /// Resolve a provider MIME type.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|format| format.mime_type().eq_ignore_ascii_case(essence))
    }

    /// Resolve a file name or path by its extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == extension)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file reported by the provider listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFile {
    /// Opaque provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Detected format.
    pub format: DocumentFormat,
}

/// Result of a bounded listing.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    /// Supported files in provider order, at most `cap` entries.
    pub files: Vec<RemoteFile>,
    /// Whether the provider had more supported files beyond the cap.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_formats_from_mime_types() {
        assert_eq!(
            DocumentFormat::from_mime_type("application/pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_mime_type("text/plain; charset=utf-8"),
            Some(DocumentFormat::Txt)
        );
        assert_eq!(
            DocumentFormat::from_mime_type(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            Some(DocumentFormat::Docx)
        );
        assert!(DocumentFormat::from_mime_type("application/vnd.google-apps.document").is_none());
    }

    #[test]
    fn resolves_formats_from_file_names() {
        assert_eq!(
            DocumentFormat::from_file_name("Report.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_file_name("notes.v2.txt"),
            Some(DocumentFormat::Txt)
        );
        assert!(DocumentFormat::from_file_name("README").is_none());
        assert!(DocumentFormat::from_file_name("image.png").is_none());
    }
}
