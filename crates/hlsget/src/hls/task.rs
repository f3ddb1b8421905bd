// HLS Download Task: owns at most one session at a time and drives it to a terminal event.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::builder::HlsTaskBuilder;
use crate::hls::config::HlsConfig;
use crate::hls::events::{DownloadEvent, DownloadListener, EventDispatcher};
use crate::hls::naming::{SegmentNamer, save_dir_for, segment_path};
use crate::hls::output::SegmentMerger;
use crate::hls::playlist::{Playlist, PlaylistResolver};
use crate::hls::progress::{SessionProgress, spawn_sampler};
use crate::hls::scheduler::{SegmentJob, SegmentScheduler};
use crate::hls::session::{Session, TaskState, TransferContext};

/// Downloads one HLS playlist at a time.
///
/// Listeners are held weakly: the caller must keep its `Arc` alive for as
/// long as it wants callbacks. A second `download` while a session is
/// running is rejected with [`HlsDownloaderError::TaskRunning`].
pub struct DownloadTask {
    shared: Arc<TaskShared>,
}

struct TaskShared {
    config: Arc<HlsConfig>,
    resolver: Arc<dyn PlaylistResolver>,
    namer: Arc<dyn SegmentNamer>,
    scheduler: SegmentScheduler,
    merger: SegmentMerger,
    callback_runtime: Option<Handle>,
    next_session: AtomicU64,
    inner: Mutex<TaskInner>,
}

#[derive(Default)]
struct TaskInner {
    state: TaskState,
    session: Option<Arc<Session>>,
    driver: Option<JoinHandle<()>>,
}

/// `<save_dir>.<ext>`
pub fn artifact_path_for(save_dir: &Path, extension: &str) -> PathBuf {
    let mut path: OsString = save_dir.as_os_str().to_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

impl DownloadTask {
    pub fn builder() -> HlsTaskBuilder {
        HlsTaskBuilder::new()
    }

    pub(crate) fn from_parts(
        config: Arc<HlsConfig>,
        resolver: Arc<dyn PlaylistResolver>,
        namer: Arc<dyn SegmentNamer>,
        scheduler: SegmentScheduler,
        callback_runtime: Option<Handle>,
    ) -> Self {
        let merger = SegmentMerger::new(config.clone());
        Self {
            shared: Arc::new(TaskShared {
                config,
                resolver,
                namer,
                scheduler,
                merger,
                callback_runtime,
                next_session: AtomicU64::new(1),
                inner: Mutex::new(TaskInner::default()),
            }),
        }
    }

    pub fn config(&self) -> &HlsConfig {
        &self.shared.config
    }

    pub fn state(&self) -> TaskState {
        self.shared.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Directory segments of `url` are saved into
    pub fn save_dir(&self, url: &str) -> PathBuf {
        save_dir_for(&self.shared.config.save_root, url)
    }

    /// Where the local playlist for `url` is written in playlist mode
    pub fn local_playlist_path(&self, url: &str) -> PathBuf {
        self.save_dir(url)
            .join(&self.shared.config.local_playlist_name)
    }

    /// Where the merged file for `url` is written in convert mode
    pub fn artifact_path(&self, url: &str) -> PathBuf {
        artifact_path_for(&self.save_dir(url), &self.shared.config.output_extension)
    }

    /// Start downloading an already parsed playlist.
    ///
    /// Segments are saved into `playlist.dir_path` when set, otherwise into the
    /// save directory derived from `playlist.base_url`. `key` only affects
    /// segment file names. Must be called from within a Tokio runtime.
    pub fn download<L>(
        &self,
        mut playlist: Playlist,
        key: Option<&str>,
        listener: &Arc<L>,
    ) -> Result<(), HlsDownloaderError>
    where
        L: DownloadListener + 'static,
    {
        let runtime = current_runtime()?;
        let events = self.dispatcher(listener)?;

        let mut inner = self.shared.inner.lock();
        if inner.state.is_running() {
            drop(inner);
            return Err(reject_busy(&events));
        }

        if playlist.dir_path.is_none() {
            playlist.dir_path = Some(save_dir_for(
                &self.shared.config.save_root,
                playlist.base_url.as_str(),
            ));
        }

        let session = self
            .shared
            .open_session(&mut inner, events, TaskState::Downloading);
        let shared = self.shared.clone();
        let key = key.map(str::to_owned);
        inner.driver = Some(runtime.spawn(async move {
            shared.drive_unless_done(session, playlist, key).await;
        }));
        Ok(())
    }

    /// Fetch the playlist at `url` and download it into the save directory of `url`
    pub fn download_url<L>(
        &self,
        url: &str,
        key: Option<&str>,
        listener: &Arc<L>,
    ) -> Result<(), HlsDownloaderError>
    where
        L: DownloadListener + 'static,
    {
        let runtime = current_runtime()?;
        let events = self.dispatcher(listener)?;

        let mut inner = self.shared.inner.lock();
        if inner.state.is_running() {
            drop(inner);
            return Err(reject_busy(&events));
        }

        let session = self
            .shared
            .open_session(&mut inner, events, TaskState::FetchingPlaylist);
        session.emit(DownloadEvent::Start);

        let shared = self.shared.clone();
        let url = url.to_owned();
        let key = key.map(str::to_owned);
        inner.driver = Some(runtime.spawn(async move {
            shared.fetch_and_drive(session, url, key).await;
        }));
        Ok(())
    }

    /// Cancel the running session, if any. No callback fires for it afterwards.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(session) = inner.session.take() {
            session.silence();
            info!(session = session.id, "Download stopped");
        }
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        if inner.state.is_running() {
            inner.state = TaskState::Aborted;
        }
    }

    fn dispatcher<L>(&self, listener: &Arc<L>) -> Result<EventDispatcher, HlsDownloaderError>
    where
        L: DownloadListener + 'static,
    {
        let runtime = match &self.shared.callback_runtime {
            Some(handle) => handle.clone(),
            None => current_runtime()?,
        };
        let listener: Weak<L> = Arc::downgrade(listener);
        let listener: Weak<dyn DownloadListener> = listener;
        Ok(EventDispatcher::spawn(listener, &runtime))
    }
}

impl Drop for DownloadTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn current_runtime() -> Result<Handle, HlsDownloaderError> {
    Handle::try_current()
        .map_err(|e| HlsDownloaderError::InternalError(format!("No Tokio runtime available: {e}")))
}

fn reject_busy(events: &EventDispatcher) -> HlsDownloaderError {
    warn!("Download requested while a session is running");
    events.emit(DownloadEvent::Error(HlsDownloaderError::TaskRunning));
    HlsDownloaderError::TaskRunning
}

impl TaskShared {
    /// Replace whatever session came before. The caller holds the lock.
    fn open_session(
        &self,
        inner: &mut TaskInner,
        events: EventDispatcher,
        state: TaskState,
    ) -> Arc<Session> {
        if let Some(previous) = inner.session.take() {
            previous.silence();
        }
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, events));
        inner.session = Some(session.clone());
        inner.state = state;
        debug!(session = id, ?state, "Session opened");
        session
    }

    /// Move the current session to `state`. Returns false if `session` was stopped or replaced.
    fn transition(&self, session: &Session, state: TaskState) -> bool {
        let mut inner = self.inner.lock();
        let current = inner.session.as_ref().is_some_and(|s| s.id == session.id);
        if !current || !session.is_active() {
            return false;
        }
        inner.state = state;
        true
    }

    fn settle(&self, session: &Session, state: TaskState) {
        let mut inner = self.inner.lock();
        if inner.session.as_ref().is_some_and(|s| s.id == session.id) {
            inner.state = state;
            inner.session = None;
            inner.driver = None;
        }
    }

    fn fail(&self, session: &Session, err: HlsDownloaderError) {
        if !err.is_task_running() {
            self.settle(session, TaskState::Aborted);
        }
        session.fail(err);
    }

    async fn fetch_and_drive(self: Arc<Self>, session: Arc<Session>, url: String, key: Option<String>) {
        let resolved = tokio::select! {
            biased;
            _ = session.token().cancelled() => return,
            r = self.resolver.resolve(&url) => r,
        };
        let mut playlist = match resolved {
            Ok(playlist) => playlist,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to acquire playlist");
                self.fail(&session, e);
                return;
            }
        };

        playlist.dir_path = Some(save_dir_for(&self.config.save_root, &url));
        if !self.transition(&session, TaskState::Downloading) {
            return;
        }
        self.drive_unless_done(session, playlist, key).await;
    }

    /// Convert mode: the merged output of an earlier run, if there is one
    async fn existing_artifact(&self, dir: &Path) -> Result<Option<PathBuf>, HlsDownloaderError> {
        if !self.config.is_convert() {
            return Ok(None);
        }
        let artifact = artifact_path_for(dir, &self.config.output_extension);
        if tokio::fs::try_exists(&artifact).await? {
            Ok(Some(artifact))
        } else {
            Ok(None)
        }
    }

    async fn drive_unless_done(
        self: Arc<Self>,
        session: Arc<Session>,
        mut playlist: Playlist,
        key: Option<String>,
    ) {
        let Some(dir) = playlist.dir_path.clone() else {
            let e = HlsDownloaderError::InternalError("Save directory was not assigned".to_string());
            self.fail(&session, e);
            return;
        };
        match self.existing_artifact(&dir).await {
            Ok(Some(artifact)) => {
                info!(path = %artifact.display(), "Artifact already exists, skipping download");
                playlist.artifact_path = Some(artifact);
                self.settle(&session, TaskState::Succeeded);
                session.succeed(playlist);
            }
            Ok(None) => self.drive(session, playlist, key).await,
            Err(e) => {
                error!(session = session.id, error = %e, "Failed to check for an existing artifact");
                self.fail(&session, e);
            }
        }
    }

    async fn drive(self: Arc<Self>, session: Arc<Session>, mut playlist: Playlist, key: Option<String>) {
        let progress = Arc::new(SessionProgress::new(playlist.total_segments()));
        let sampler = spawn_sampler(
            progress.clone(),
            self.config.progress_interval,
            session.clone(),
        );

        let result = self
            .run_session(&session, &mut playlist, key.as_deref(), progress)
            .await;

        // The sampler must be gone before the terminal event is queued
        session.cancel();
        let _ = sampler.await;

        match result {
            Ok(()) => {
                info!(
                    session = session.id,
                    segments = playlist.total_segments(),
                    dir = ?playlist.dir_path,
                    artifact = ?playlist.artifact_path,
                    "Download finished"
                );
                self.settle(&session, TaskState::Succeeded);
                session.succeed(playlist);
            }
            Err(e) => {
                if e.is_cancellation() {
                    debug!(session = session.id, "Session cancelled");
                } else {
                    error!(session = session.id, error = %e, "Download failed");
                }
                self.fail(&session, e);
            }
        }
    }

    async fn run_session(
        &self,
        session: &Arc<Session>,
        playlist: &mut Playlist,
        key: Option<&str>,
        progress: Arc<SessionProgress>,
    ) -> Result<(), HlsDownloaderError> {
        let dir = playlist.dir_path.clone().ok_or_else(|| {
            HlsDownloaderError::InternalError("Save directory was not assigned".to_string())
        })?;

        tokio::fs::create_dir_all(&dir).await?;
        if let Some(decryption_key) = playlist.key.as_ref().filter(|k| !k.is_empty()) {
            tokio::fs::write(dir.join(&self.config.key_file_name), decryption_key).await?;
        }

        let jobs: Vec<SegmentJob> = playlist
            .segments
            .iter()
            .map(|segment| SegmentJob {
                path: segment_path(self.namer.as_ref(), &dir, key, segment),
                segment: segment.clone(),
            })
            .collect();
        let paths: Vec<PathBuf> = jobs.iter().map(|job| job.path.clone()).collect();

        info!(
            session = session.id,
            segments = jobs.len(),
            dir = %dir.display(),
            "Downloading segments"
        );

        let ctx = Arc::new(TransferContext {
            session: session.clone(),
            progress,
        });
        let sizes = self
            .scheduler
            .run(playlist.base_url.clone(), jobs, ctx)
            .await?;

        for (segment, size) in playlist.segments.iter_mut().zip(sizes) {
            segment.file_size = size;
        }

        if !self.transition(session, TaskState::Finalizing) {
            return Err(HlsDownloaderError::Cancelled);
        }

        if self.config.is_convert() {
            session.emit(DownloadEvent::Converting);
            let output = artifact_path_for(&dir, &self.config.output_extension);
            let merged = tokio::select! {
                biased;
                _ = session.token().cancelled() => return Err(HlsDownloaderError::Cancelled),
                r = self.merger.convert(playlist, &dir, &paths, &output) => r?,
            };
            playlist.artifact_path = merged;
        } else {
            let names: Vec<String> = paths
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect();
            let local = self.merger.write_local_playlist(playlist, &dir, &names).await?;
            playlist.artifact_path = Some(local);
        }

        Ok(())
    }
}
