use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::DownloadError;
use crate::client::create_client;
use crate::config::DownloaderConfig;
use crate::hls::config::{HlsConfig, OutputMode};
use crate::hls::fetcher::{HttpSegmentFetcher, SegmentTransport};
use crate::hls::naming::{HashedSegmentNamer, SegmentNamer};
use crate::hls::playlist::{HttpPlaylistResolver, PlaylistResolver};
use crate::hls::scheduler::SegmentScheduler;
use crate::hls::task::DownloadTask;

/// Builder for [`DownloadTask`].
///
/// Collaborators that are not supplied are built from the configuration: an
/// HTTP fetcher and resolver sharing one `reqwest::Client`, and the hashed
/// segment namer.
#[derive(Default)]
pub struct HlsTaskBuilder {
    config: HlsConfig,
    transport: Option<Arc<dyn SegmentTransport>>,
    resolver: Option<Arc<dyn PlaylistResolver>>,
    namer: Option<Arc<dyn SegmentNamer>>,
    callback_runtime: Option<Handle>,
}

impl HlsTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: HlsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_downloader_config(mut self, base: DownloaderConfig) -> Self {
        self.config.base = base;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.config.download_concurrency = workers;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = interval;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn with_output_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.output_extension = extension.into();
        self
    }

    pub fn with_save_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.save_root = root.into();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn SegmentTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PlaylistResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_namer(mut self, namer: Arc<dyn SegmentNamer>) -> Self {
        self.namer = Some(namer);
        self
    }

    /// Deliver listener callbacks on `handle` instead of the runtime `download` is called from
    pub fn with_callback_runtime(mut self, handle: Handle) -> Self {
        self.callback_runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<DownloadTask, DownloadError> {
        let config = Arc::new(self.config);

        let mut client: Option<reqwest::Client> = None;
        let mut shared_client = || -> Result<reqwest::Client, DownloadError> {
            match &client {
                Some(c) => Ok(c.clone()),
                None => {
                    let c = create_client(&config.base)?;
                    client = Some(c.clone());
                    Ok(c)
                }
            }
        };

        let transport: Arc<dyn SegmentTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpSegmentFetcher::new(shared_client()?)),
        };
        let resolver: Arc<dyn PlaylistResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(HttpPlaylistResolver::new(shared_client()?, config.clone())),
        };
        let namer: Arc<dyn SegmentNamer> = match self.namer {
            Some(namer) => namer,
            None => Arc::new(HashedSegmentNamer),
        };

        let scheduler = SegmentScheduler::new(transport, config.workers());
        Ok(DownloadTask::from_parts(
            config,
            resolver,
            namer,
            scheduler,
            self.callback_runtime,
        ))
    }
}
