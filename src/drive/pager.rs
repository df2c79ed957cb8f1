//! Streaming helper for iterating Drive listing pages without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde::Deserialize;

use super::client::GoogleDriveSource;
use super::types::{DocumentFormat, RemoteFile, SourceError};
use crate::auth::Credential;

const MAX_PAGE_SIZE: usize = 100;
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
}

/// Build the Drive search query selecting supported, non-trashed files.
pub(crate) fn supported_files_query() -> String {
    let clauses = DocumentFormat::ALL
        .iter()
        .map(|format| format!("mimeType='{}'", format.mime_type()))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("({clauses}) and trashed=false")
}

/// Page size requested for a listing bounded by `cap`.
pub(crate) fn page_size_for(cap: usize) -> usize {
    cap.clamp(1, MAX_PAGE_SIZE)
}

/// Stream supported files across every listing page, in provider order.
///
/// Entries whose MIME type is not supported are skipped; pagination stops when the provider
/// stops returning a `nextPageToken` or the consumer drops the stream.
pub fn stream_files<'a>(
    source: &'a GoogleDriveSource,
    credential: &'a Credential,
    page_size: usize,
) -> impl Stream<Item = Result<RemoteFile, SourceError>> + 'a {
    try_stream! {
        let query = supported_files_query();
        let page_size = page_size.to_string();
        let mut page_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", LIST_FIELDS),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = source
                .request(Method::GET, "files", credential)
                .query(&params)
                .send()
                .await
                .map_err(|error| source.transport_error(error))?;
            let response = source.check_status(response).await?;
            let page: FileListResponse = response
                .json()
                .await
                .map_err(|error| source.transport_error(error))?;

            tracing::debug!(files = page.files.len(), has_next = page.next_page_token.is_some(), "Fetched listing page");

            for file in page.files {
                match DocumentFormat::from_mime_type(&file.mime_type) {
                    Some(format) => yield RemoteFile { id: file.id, name: file.name, format },
                    None => tracing::trace!(mime_type = %file.mime_type, "Skipping unsupported file"),
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
    }
}
