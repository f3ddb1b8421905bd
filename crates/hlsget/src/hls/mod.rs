// HLS download engine: one task, one session at a time, segments fetched by a worker pool

pub mod builder;
pub mod config;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod naming;
pub mod output;
pub mod playlist;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod task;

// Re-exports for easier access
pub use builder::HlsTaskBuilder;
pub use config::{HlsConfig, OutputMode};
pub use error::HlsDownloaderError;
pub use events::{ChannelListener, DownloadEvent, DownloadListener};
pub use fetcher::{HttpSegmentFetcher, SegmentTransport, TransferObserver};
pub use naming::{HashedSegmentNamer, SegmentNamer, save_dir_for};
pub use playlist::{HttpPlaylistResolver, Playlist, PlaylistResolver, Segment};
pub use session::TaskState;
pub use task::DownloadTask;
