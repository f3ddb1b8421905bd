// Session-wide progress counters and the periodic sampler that reports them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::hls::events::DownloadEvent;
use crate::hls::session::Session;

/// Point-in-time view of a session's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_segments: usize,
    pub processed_segments: u64,
    /// Bytes received over the network in this session
    pub transferred_bytes: u64,
    /// On-disk size of every segment finished so far, resumed ones included
    pub completed_bytes: u64,
    pub last_segment_bytes: u64,
}

impl ProgressSnapshot {
    pub fn downloading_event(&self) -> DownloadEvent {
        DownloadEvent::Downloading {
            total_bytes: self.completed_bytes,
            last_segment_bytes: self.last_segment_bytes,
            total_segments: self.total_segments,
            processed_segments: self.processed_segments,
        }
    }
}

/// Counters shared by every worker of a session. All updates are atomic and
/// only ever increase.
#[derive(Debug)]
pub struct SessionProgress {
    total_segments: usize,
    /// 1-based: starts at 1 and is bumped once per finished segment
    processed: AtomicU64,
    transferred: AtomicU64,
    completed_bytes: AtomicU64,
    last_segment_bytes: AtomicU64,
    transfer_started: AtomicBool,
}

impl SessionProgress {
    pub fn new(total_segments: usize) -> Self {
        Self {
            total_segments,
            processed: AtomicU64::new(1),
            transferred: AtomicU64::new(0),
            completed_bytes: AtomicU64::new(0),
            last_segment_bytes: AtomicU64::new(0),
            transfer_started: AtomicBool::new(false),
        }
    }

    pub fn total_segments(&self) -> usize {
        self.total_segments
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Add freshly written bytes, returns the new cumulative total
    pub fn add_transferred(&self, bytes: u64) -> u64 {
        self.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// Returns true exactly once per session, for the first transfer to start
    pub fn mark_transfer_started(&self) -> bool {
        !self.transfer_started.swap(true, Ordering::AcqRel)
    }

    /// Record a finished segment of `size` bytes and return the updated snapshot
    pub fn complete_segment(&self, size: u64) -> ProgressSnapshot {
        self.last_segment_bytes.store(size, Ordering::Release);
        self.completed_bytes.fetch_add(size, Ordering::AcqRel);
        self.processed.fetch_add(1, Ordering::AcqRel);
        self.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_segments: self.total_segments,
            processed_segments: self.processed.load(Ordering::Acquire),
            transferred_bytes: self.transferred.load(Ordering::Acquire),
            completed_bytes: self.completed_bytes.load(Ordering::Acquire),
            last_segment_bytes: self.last_segment_bytes.load(Ordering::Acquire),
        }
    }
}

/// Spawn the fixed-interval sampler. The first sample is taken immediately;
/// the task ends when the session is cancelled and never reports past its
/// terminal event.
pub fn spawn_sampler(
    progress: Arc<SessionProgress>,
    interval: Duration,
    session: Arc<Session>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = session.token().cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = progress.snapshot();
                    session.emit(DownloadEvent::Progress {
                        cumulative_bytes: snapshot.transferred_bytes,
                    });
                    session.emit(snapshot.downloading_event());
                }
            }
        }
        trace!(session = session.id, "Progress sampler stopped");
    })
}
