use hlsget_engine::HlsDownloaderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] hlsget_engine::DownloadError),

    #[error("HLS error: {0}")]
    Hls(#[from] HlsDownloaderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Interrupted")]
    Interrupted,
}
