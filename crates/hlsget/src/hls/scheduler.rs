// HLS Segment Scheduler: a fixed pool of workers draining the segment list of one session.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::task::JoinSet;
use tracing::{debug, error, trace};
use url::Url;

use crate::hls::HlsDownloaderError;
use crate::hls::fetcher::SegmentTransport;
use crate::hls::playlist::Segment;
use crate::hls::session::TransferContext;

/// One unit of work: a segment and where it lives on disk
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub segment: Segment,
    pub path: PathBuf,
}

pub struct SegmentScheduler {
    transport: Arc<dyn SegmentTransport>,
    concurrency: usize,
}

struct WorkQueue {
    jobs: Vec<SegmentJob>,
    cursor: AtomicUsize,
    sizes: Vec<AtomicU64>,
    base_url: Url,
}

impl WorkQueue {
    fn next(&self) -> Option<(usize, &SegmentJob)> {
        let position = self.cursor.fetch_add(1, Ordering::AcqRel);
        self.jobs.get(position).map(|job| (position, job))
    }
}

impl SegmentScheduler {
    pub fn new(transport: Arc<dyn SegmentTransport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Process every job, returning the on-disk size of each in job order.
    ///
    /// The first failing segment cancels the session and every other worker
    /// bails out at its next await point. Returns once all workers have
    /// exited; the caller reports the returned error.
    pub async fn run(
        &self,
        base_url: Url,
        jobs: Vec<SegmentJob>,
        ctx: Arc<TransferContext>,
    ) -> Result<Vec<u64>, HlsDownloaderError> {
        let sizes = jobs.iter().map(|_| AtomicU64::new(0)).collect();
        let worker_count = self.concurrency.min(jobs.len()).max(1);
        let queue = Arc::new(WorkQueue {
            jobs,
            cursor: AtomicUsize::new(0),
            sizes,
            base_url,
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(Self::worker(
                worker_id,
                self.transport.clone(),
                queue.clone(),
                ctx.clone(),
            ));
        }
        debug!(workers = worker_count, segments = queue.jobs.len(), "Segment workers started");

        let mut outcome = Ok(());
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                if e.is_cancelled() {
                    Err(HlsDownloaderError::Cancelled)
                } else {
                    ctx.session.cancel();
                    Err(HlsDownloaderError::InternalError(format!(
                        "Segment worker panicked: {e}"
                    )))
                }
            });
            // Keep the root cause, not the cancellations it triggered
            if let Err(e) = result {
                match &outcome {
                    Ok(()) => outcome = Err(e),
                    Err(prev) if prev.is_cancellation() && !e.is_cancellation() => outcome = Err(e),
                    Err(_) => {}
                }
            }
        }
        outcome?;

        Ok(queue
            .sizes
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .collect())
    }

    async fn worker(
        worker_id: usize,
        transport: Arc<dyn SegmentTransport>,
        queue: Arc<WorkQueue>,
        ctx: Arc<TransferContext>,
    ) -> Result<(), HlsDownloaderError> {
        let token = ctx.session.token().clone();
        while let Some((position, job)) = queue.next() {
            if token.is_cancelled() {
                return Err(HlsDownloaderError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(HlsDownloaderError::Cancelled),
                r = Self::process(transport.as_ref(), &queue.base_url, job, &ctx) => r,
            };

            match result {
                Ok(size) => queue.sizes[position].store(size, Ordering::Release),
                Err(e) => {
                    if !e.is_cancellation() {
                        error!(worker = worker_id, url = %job.segment.url, error = %e, "Segment failed, aborting session");
                    }
                    ctx.session.cancel();
                    return Err(e);
                }
            }
        }
        trace!(worker = worker_id, "No segments left, worker exiting");
        Ok(())
    }

    async fn process(
        transport: &dyn SegmentTransport,
        base_url: &Url,
        job: &SegmentJob,
        ctx: &TransferContext,
    ) -> Result<u64, HlsDownloaderError> {
        // Resume: a file at the final path is always complete, partial writes go to `.part`
        if tokio::fs::try_exists(&job.path).await? {
            let size = tokio::fs::metadata(&job.path).await?.len();
            ctx.progress.complete_segment(size);
            debug!(index = job.segment.index, path = %job.path.display(), "Segment already on disk");
            return Ok(size);
        }

        let url = job.segment.full_url(base_url)?;
        transport.fetch_to_file(&url, &job.path, ctx).await?;

        let size = tokio::fs::metadata(&job.path).await?.len();
        let snapshot = ctx.progress.complete_segment(size);
        ctx.session.emit(snapshot.downloading_event());
        Ok(size)
    }
}
