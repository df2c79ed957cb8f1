//! HTTP client wrapper for the Google Drive v3 API.

use crate::auth::Credential;
use crate::config::Config;
use crate::drive::FileSource;
use crate::drive::pager::{page_size_for, stream_files};
use crate::drive::types::{FileListing, RemoteFile, SourceError};
use async_trait::async_trait;
use futures_util::{pin_mut, stream::StreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::HashSet;
use std::time::Duration;

/// Lightweight HTTP client for Drive listing and downloads.
pub struct GoogleDriveSource {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
}

impl GoogleDriveSource {
    /// Construct a client for the given Drive API base URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent("drive-digest/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(SourceError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized Drive HTTP client");
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Construct a client using the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        Self::new(&config.google_drive_api_url, config.request_timeout())
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
    ) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(credential.access_token())
    }

    pub(crate) fn transport_error(&self, error: reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Http(error)
        }
    }

    pub(crate) async fn check_status(&self, response: Response) -> Result<Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthorized { status });
        }
        let body = response.text().await.unwrap_or_default();
        let error = SourceError::UnexpectedStatus { status, body };
        tracing::error!(error = %error, "Drive request failed");
        Err(error)
    }
}

#[async_trait]
impl FileSource for GoogleDriveSource {
    async fn list(&self, credential: &Credential, cap: usize) -> Result<FileListing, SourceError> {
        let mut listing = FileListing::default();
        if cap == 0 {
            return Ok(listing);
        }

        let mut seen = HashSet::new();
        let stream = stream_files(self, credential, page_size_for(cap));
        pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let file = item?;
            if !seen.insert(file.id.clone()) {
                continue;
            }
            if listing.files.len() >= cap {
                listing.truncated = true;
                tracing::warn!(cap, "File cap reached; remaining files will not be processed");
                break;
            }
            listing.files.push(file);
        }

        tracing::info!(
            files = listing.files.len(),
            cap,
            truncated = listing.truncated,
            "Listed supported files"
        );
        Ok(listing)
    }

    async fn download(
        &self,
        credential: &Credential,
        file: &RemoteFile,
    ) -> Result<Vec<u8>, SourceError> {
        let response = self
            .request(Method::GET, &format!("files/{}", file.id), credential)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;
        let response = self.check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| self.transport_error(error))?;
        tracing::debug!(file_id = %file.id, bytes = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("empty URL".into());
    }
    let parsed = url::Url::parse(trimmed).map_err(|error| format!("{trimmed}: {error}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("{trimmed}: unsupported scheme"));
    }
    Ok(trimmed.to_string())
}
