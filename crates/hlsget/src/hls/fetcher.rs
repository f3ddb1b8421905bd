// HLS Segment Fetcher: streams one segment over HTTP into a local file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use url::Url;

use crate::hls::HlsDownloaderError;

/// Receives transfer notifications from a fetch in progress
pub trait TransferObserver: Send + Sync {
    /// The server answered 200 and the body is about to be streamed
    fn on_transfer_start(&self);

    /// `bytes` more bytes were written to disk
    fn on_bytes_written(&self, bytes: u64);
}

#[async_trait]
pub trait SegmentTransport: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// `dest` only appears once the whole body has been written.
    async fn fetch_to_file(
        &self,
        url: &Url,
        dest: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, HlsDownloaderError>;
}

pub struct HttpSegmentFetcher {
    http_client: Client,
}

impl HttpSegmentFetcher {
    /// Timeouts come from the client, see [`crate::create_client`]
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn stream_body(
        response: reqwest::Response,
        part_path: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, HlsDownloaderError> {
        let mut file = File::create(part_path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            observer.on_bytes_written(chunk.len() as u64);
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Sibling path used while a segment is still being written
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("segment"));
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl SegmentTransport for HttpSegmentFetcher {
    async fn fetch_to_file(
        &self,
        url: &Url,
        dest: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, HlsDownloaderError> {
        let response = self.http_client.get(url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            return Err(HlsDownloaderError::SegmentStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }
        observer.on_transfer_start();

        let part = part_path(dest);
        match Self::stream_body(response, &part, observer).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await?;
                trace!(url = %url, bytes = written, "Segment written");
                Ok(written)
            }
            Err(e) => {
                // Best effort, the primary error is what matters
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    debug!(path = %part.display(), error = %cleanup, "Could not remove partial segment");
                }
                Err(e)
            }
        }
    }
}
