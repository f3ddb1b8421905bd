// Finalize step: rewrite a local playlist, or decrypt and merge every segment into one file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use m3u8_rs::{Key, KeyMethod, MediaPlaylist, MediaSegment};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::decryption::{decrypt_segment, resolve_iv};
use crate::hls::fetcher::part_path;
use crate::hls::playlist::Playlist;

pub struct SegmentMerger {
    config: Arc<HlsConfig>,
}

impl SegmentMerger {
    pub fn new(config: Arc<HlsConfig>) -> Self {
        Self { config }
    }

    /// Build the local playlist text. `file_names` is parallel to `playlist.segments`.
    pub fn render_local_playlist(
        &self,
        playlist: &Playlist,
        file_names: &[String],
    ) -> Result<Vec<u8>, HlsDownloaderError> {
        let key = playlist.has_key().then(|| Key {
            method: KeyMethod::AES128,
            uri: Some(self.config.key_file_name.clone()),
            iv: playlist.iv.clone(),
            keyformat: None,
            keyformatversions: None,
        });

        let segments = playlist
            .segments
            .iter()
            .zip(file_names)
            .enumerate()
            .map(|(i, (segment, name))| MediaSegment {
                uri: name.clone(),
                duration: segment.duration,
                // One key tag up front covers every segment
                key: if i == 0 { key.clone() } else { None },
                ..MediaSegment::empty()
            })
            .collect();

        let media = MediaPlaylist {
            version: Some(3),
            target_duration: playlist.target_duration(),
            media_sequence: playlist.segments.first().map(|s| s.index).unwrap_or(0),
            segments,
            end_list: true,
            ..Default::default()
        };

        let mut out = Vec::new();
        media.write_to(&mut out)?;
        Ok(out)
    }

    /// Playlist mode: write `<dir>/<local_playlist_name>` referencing the local segment files
    pub async fn write_local_playlist(
        &self,
        playlist: &Playlist,
        dir: &Path,
        file_names: &[String],
    ) -> Result<PathBuf, HlsDownloaderError> {
        let content = self.render_local_playlist(playlist, file_names)?;
        let path = dir.join(&self.config.local_playlist_name);
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), segments = file_names.len(), "Local playlist written");
        Ok(path)
    }

    /// Convert mode: concatenate segments in playlist order into `output`.
    ///
    /// Missing segment files are skipped. Returns `None` when nothing was
    /// written, in which case no output file is left behind. The segment
    /// directory is only removed once the output is in place.
    pub async fn convert(
        &self,
        playlist: &Playlist,
        dir: &Path,
        segment_paths: &[PathBuf],
        output: &Path,
    ) -> Result<Option<PathBuf>, HlsDownloaderError> {
        let staging = part_path(output);
        let written = match self.merge_into(playlist, segment_paths, &staging).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        let merged = if written == 0 {
            debug!(output = %output.display(), "Merged output is empty, removing it");
            tokio::fs::remove_file(&staging).await?;
            if tokio::fs::try_exists(output).await? {
                tokio::fs::remove_file(output).await?;
            }
            None
        } else {
            // Replaces a stale output from an earlier run
            if let Err(e) = tokio::fs::rename(&staging, output).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e.into());
            }
            info!(output = %output.display(), bytes = written, "Segments merged");
            Some(output.to_path_buf())
        };

        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to clear segment directory");
        }
        Ok(merged)
    }

    async fn merge_into(
        &self,
        playlist: &Playlist,
        segment_paths: &[PathBuf],
        staging: &Path,
    ) -> Result<u64, HlsDownloaderError> {
        let key = playlist.key.clone().filter(|k| !k.is_empty());
        let iv = resolve_iv(playlist.iv.as_deref());

        let mut out = File::create(staging).await?;
        let mut written = 0u64;

        for path in segment_paths {
            if !tokio::fs::try_exists(path).await? {
                warn!(path = %path.display(), "Segment missing, leaving a gap");
                continue;
            }

            match &key {
                Some(key) => {
                    let data = tokio::fs::read(path).await?;
                    let key = key.clone();
                    let plain =
                        tokio::task::spawn_blocking(move || decrypt_segment(data, &key, &iv))
                            .await
                            .map_err(|e| HlsDownloaderError::InternalError(e.to_string()))??;
                    out.write_all(&plain).await?;
                    written += plain.len() as u64;
                }
                None => {
                    let mut input = File::open(path).await?;
                    written += tokio::io::copy(&mut input, &mut out).await?;
                }
            }
        }

        out.flush().await?;
        Ok(written)
    }
}
