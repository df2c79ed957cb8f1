//! Remote file storage integration.
//!
//! The pipeline depends on [`FileSource`] only; [`GoogleDriveSource`] is the production
//! adapter. Every call receives the session's [`Credential`] explicitly.

pub mod client;
pub mod pager;
pub mod types;

pub use client::GoogleDriveSource;
pub use types::{DocumentFormat, FileListing, RemoteFile, SourceError};

use crate::auth::Credential;
use async_trait::async_trait;

/// Capability set of a remote file store: bounded listing and per-file download.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// List supported files in provider order, stopping once `cap` files were collected.
    async fn list(&self, credential: &Credential, cap: usize) -> Result<FileListing, SourceError>;

    /// Download the raw bytes of a listed file.
    async fn download(
        &self,
        credential: &Credential,
        file: &RemoteFile,
    ) -> Result<Vec<u8>, SourceError>;
}
