//! # hlsget
//!
//! Downloads HLS (HTTP Live Streaming) VOD playlists to local storage.
//!
//! ## Features
//!
//! - Parallel segment download with a fixed worker pool
//! - Resume from whatever segment files are already on disk
//! - AES-128-CBC decryption while merging into a single file
//! - Local playlist rewrite for playback straight from disk
//! - Listener callbacks for progress and terminal events
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hlsget_engine::hls::{ChannelListener, DownloadEvent, DownloadTask, OutputMode};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let task = DownloadTask::builder()
//!     .with_output_mode(OutputMode::Convert)
//!     .with_save_root("downloads")
//!     .build()?;
//!
//! let (listener, mut events) = ChannelListener::new();
//! task.download_url("https://example.com/vod/index.m3u8", None, &listener)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let DownloadEvent::Success(playlist) = &event {
//!         println!("saved to {:?}", playlist.artifact_path);
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod hls;
pub mod proxy;

pub use builder::DownloaderConfigBuilder;
pub use client::create_client;
pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};

pub use hls::{DownloadTask, HlsConfig, HlsDownloaderError, HlsTaskBuilder, OutputMode};
