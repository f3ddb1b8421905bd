use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::trace;

use crate::hls::HlsDownloaderError;
use crate::hls::playlist::Playlist;

/// Everything a task reports to its caller, in emission order
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Playlist acquisition has begun
    Start,
    /// First segment transfer of the session started
    StartDownload { total_segments: usize, current: u64 },
    Downloading {
        total_bytes: u64,
        last_segment_bytes: u64,
        total_segments: usize,
        processed_segments: u64,
    },
    /// Periodic sample of bytes transferred so far
    Progress { cumulative_bytes: u64 },
    Converting,
    Success(Box<Playlist>),
    Error(HlsDownloaderError),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Success(_) | DownloadEvent::Error(_))
    }
}

/// Observer of a download task. Only the terminal callbacks are required.
#[allow(unused_variables)]
pub trait DownloadListener: Send + Sync {
    fn on_start(&self) {}

    fn on_start_download(&self, total_segments: usize, current: u64) {}

    fn on_downloading(
        &self,
        total_bytes: u64,
        last_segment_bytes: u64,
        total_segments: usize,
        processed_segments: u64,
    ) {
    }

    fn on_progress(&self, cumulative_bytes: u64) {}

    fn on_converting(&self) {}

    fn on_success(&self, playlist: &Playlist);

    fn on_error(&self, error: &HlsDownloaderError);
}

fn deliver(listener: &dyn DownloadListener, event: DownloadEvent) {
    match event {
        DownloadEvent::Start => listener.on_start(),
        DownloadEvent::StartDownload {
            total_segments,
            current,
        } => listener.on_start_download(total_segments, current),
        DownloadEvent::Downloading {
            total_bytes,
            last_segment_bytes,
            total_segments,
            processed_segments,
        } => listener.on_downloading(
            total_bytes,
            last_segment_bytes,
            total_segments,
            processed_segments,
        ),
        DownloadEvent::Progress { cumulative_bytes } => listener.on_progress(cumulative_bytes),
        DownloadEvent::Converting => listener.on_converting(),
        DownloadEvent::Success(playlist) => listener.on_success(&playlist),
        DownloadEvent::Error(error) => listener.on_error(&error),
    }
}

/// Marshals events onto a dispatcher task running on a caller-chosen runtime.
///
/// Only a `Weak` handle to the listener is kept: once the caller drops its
/// listener, pending and future events are discarded.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl EventDispatcher {
    pub fn spawn(listener: Weak<dyn DownloadListener>, runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DownloadEvent>();
        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(listener) = listener.upgrade() else {
                    trace!("Listener dropped, discarding remaining events");
                    break;
                };
                deliver(listener.as_ref(), event);
            }
        });
        Self { tx }
    }

    pub fn emit(&self, event: DownloadEvent) {
        // The receiver only goes away once the listener is dropped
        let _ = self.tx.send(event);
    }
}

/// Listener that forwards every callback into a channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }
}

impl DownloadListener for ChannelListener {
    fn on_start(&self) {
        self.send(DownloadEvent::Start);
    }

    fn on_start_download(&self, total_segments: usize, current: u64) {
        self.send(DownloadEvent::StartDownload {
            total_segments,
            current,
        });
    }

    fn on_downloading(
        &self,
        total_bytes: u64,
        last_segment_bytes: u64,
        total_segments: usize,
        processed_segments: u64,
    ) {
        self.send(DownloadEvent::Downloading {
            total_bytes,
            last_segment_bytes,
            total_segments,
            processed_segments,
        });
    }

    fn on_progress(&self, cumulative_bytes: u64) {
        self.send(DownloadEvent::Progress { cumulative_bytes });
    }

    fn on_converting(&self) {
        self.send(DownloadEvent::Converting);
    }

    fn on_success(&self, playlist: &Playlist) {
        self.send(DownloadEvent::Success(Box::new(playlist.clone())));
    }

    fn on_error(&self, error: &HlsDownloaderError) {
        self.send(DownloadEvent::Error(error.clone()));
    }
}
