// One download session: cancellation and terminal-event gating.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hls::HlsDownloaderError;
use crate::hls::events::{DownloadEvent, EventDispatcher};
use crate::hls::fetcher::TransferObserver;
use crate::hls::playlist::Playlist;
use crate::hls::progress::SessionProgress;

/// Lifecycle of a [`crate::hls::DownloadTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    FetchingPlaylist,
    Downloading,
    Finalizing,
    Succeeded,
    Aborted,
}

impl TaskState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            TaskState::FetchingPlaylist | TaskState::Downloading | TaskState::Finalizing
        )
    }
}

pub struct Session {
    pub id: u64,
    token: CancellationToken,
    /// Set once a terminal event went out, or once the caller stopped us
    closed: AtomicBool,
    events: EventDispatcher,
}

impl Session {
    pub fn new(id: u64, events: EventDispatcher) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            events,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Non-terminal event, dropped once the session is closed
    pub fn emit(&self, event: DownloadEvent) {
        if !self.closed.load(Ordering::Acquire) {
            self.events.emit(event);
        }
    }

    /// Stop every activity bound to this session. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Caller-initiated stop: cancel and suppress any further callbacks
    pub fn silence(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel();
    }

    /// Emit the single terminal event of this session, returns false if one already went out
    fn close_with(&self, event: DownloadEvent) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(session = self.id, "Session already closed, dropping terminal event");
            return false;
        }
        self.events.emit(event);
        true
    }

    pub fn succeed(&self, playlist: Playlist) -> bool {
        // Stop the sampler first so nothing trails the success event
        self.cancel();
        self.close_with(DownloadEvent::Success(Box::new(playlist)))
    }

    /// Single error path: stop unless the error is "busy", then report unless cancelled
    pub fn fail(&self, error: HlsDownloaderError) -> bool {
        if !error.is_task_running() {
            self.cancel();
        }
        if error.is_cancellation() {
            return false;
        }
        self.close_with(DownloadEvent::Error(error))
    }
}

/// Per-session view handed to the fetcher while a segment streams in
pub struct TransferContext {
    pub session: Arc<Session>,
    pub progress: Arc<SessionProgress>,
}

impl TransferObserver for TransferContext {
    fn on_transfer_start(&self) {
        if self.progress.mark_transfer_started() {
            self.session.emit(DownloadEvent::StartDownload {
                total_segments: self.progress.total_segments(),
                current: self.progress.processed(),
            });
        }
    }

    fn on_bytes_written(&self, bytes: u64) {
        self.progress.add_transferred(bytes);
    }
}
