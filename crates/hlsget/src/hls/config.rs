use std::path::PathBuf;
use std::time::Duration;

use crate::DownloaderConfig;

/// What a finished session leaves on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Keep the segment directory and write a local playlist that points into it
    #[default]
    Playlist,
    /// Decrypt and concatenate every segment into `<save_dir>.<ext>`, then clear the directory
    Convert,
}

#[derive(Debug, Clone)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    /// Number of segment workers per session
    pub download_concurrency: usize,
    /// Interval of the cumulative-bytes progress sampler
    pub progress_interval: Duration,
    pub output_mode: OutputMode,
    /// Extension of the merged artifact in convert mode
    pub output_extension: String,
    pub local_playlist_name: String,
    pub key_file_name: String,
    /// Directory under which per-URL save directories are created
    pub save_root: PathBuf,
    pub playlist_fetch_timeout: Duration,
    pub key_fetch_timeout: Duration,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            base: DownloaderConfig::default(),
            download_concurrency: 3,
            progress_interval: Duration::from_millis(1500),
            output_mode: OutputMode::default(),
            output_extension: "mp4".to_string(),
            local_playlist_name: "local.m3u8".to_string(),
            key_file_name: "key.key".to_string(),
            save_root: PathBuf::from("downloads"),
            playlist_fetch_timeout: Duration::from_secs(15),
            key_fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl HlsConfig {
    pub fn is_convert(&self) -> bool {
        self.output_mode == OutputMode::Convert
    }

    /// Worker count, never below one
    pub fn workers(&self) -> usize {
        self.download_concurrency.max(1)
    }
}
