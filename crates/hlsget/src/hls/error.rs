use std::sync::Arc;

use reqwest::StatusCode;

/// Errors surfaced by a download task.
///
/// The type is `Clone` so a single failure can be handed to listeners and
/// kept in logs at the same time; non-clonable sources are wrapped in `Arc`.
#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("Task running")]
    TaskRunning,
    #[error("Segment {url} returned HTTP {status}")]
    SegmentStatus { url: String, status: StatusCode },
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Segment naming error: {0}")]
    NamingError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl HlsDownloaderError {
    /// Cancellation caused by `stop()` is never reported to listeners.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HlsDownloaderError::Cancelled)
    }

    /// A busy error must not tear down the session that made us busy.
    pub fn is_task_running(&self) -> bool {
        matches!(self, HlsDownloaderError::TaskRunning)
    }
}

// Manual implementation of From<reqwest::Error> because of the Arc wrapping.
impl From<reqwest::Error> for HlsDownloaderError {
    fn from(err: reqwest::Error) -> Self {
        HlsDownloaderError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsDownloaderError {
    fn from(err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            source: Arc::new(err),
        }
    }
}
