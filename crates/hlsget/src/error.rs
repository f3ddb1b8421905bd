use crate::hls::HlsDownloaderError;

// Custom error type for setup and client construction
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsDownloaderError),
}
