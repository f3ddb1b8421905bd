// Playlist model and acquisition: turns a remote m3u8 into an ordered list of segments.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use m3u8_rs::{KeyMethod, MediaPlaylist, parse_playlist_res};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;

/// One media segment of a playlist
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Absolute URL, or relative to the playlist base URL
    pub url: String,
    /// Position in the stream, defines the final ordering
    pub index: u64,
    /// EXTINF duration in seconds
    pub duration: f32,
    /// Bytes on disk, recorded once the segment has been fetched or found locally
    pub file_size: u64,
}

impl Segment {
    pub fn new(url: impl Into<String>, index: u64, duration: f32) -> Self {
        Self {
            url: url.into(),
            index,
            duration,
            file_size: 0,
        }
    }

    /// Resolve this segment against the playlist base URL
    pub fn full_url(&self, base_url: &Url) -> Result<Url, HlsDownloaderError> {
        base_url.join(&self.url).map_err(|e| {
            HlsDownloaderError::InvalidUrl(format!(
                "Could not join base URL {base_url} with segment URI {}: {e}",
                self.url
            ))
        })
    }
}

/// A parsed media playlist plus the local paths filled in while a task runs
#[derive(Debug, Clone)]
pub struct Playlist {
    pub segments: Vec<Segment>,
    /// Raw AES-128 key bytes
    pub key: Option<Bytes>,
    /// IV attribute as written in the playlist (`0x`-prefixed hex, or raw)
    pub iv: Option<String>,
    pub base_url: Url,
    /// Save directory, assigned when the download begins
    pub dir_path: Option<PathBuf>,
    /// Local playlist or merged file, assigned when finalizing completes
    pub artifact_path: Option<PathBuf>,
}

impl Playlist {
    pub fn new(base_url: Url, segments: Vec<Segment>) -> Self {
        Self {
            segments,
            key: None,
            iv: None,
            base_url,
            dir_path: None,
            artifact_path: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>, iv: Option<String>) -> Self {
        self.key = Some(key.into());
        self.iv = iv;
        self
    }

    /// Accept a key in its ISO-8859-1 string form, one char per byte.
    ///
    /// Chars above U+00FF cannot come from a Latin-1 decoding and are rejected.
    pub fn with_latin1_key(
        self,
        key: &str,
        iv: Option<String>,
    ) -> Result<Self, HlsDownloaderError> {
        let bytes = key
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    HlsDownloaderError::DecryptionError(format!(
                        "Key character {c:?} is outside ISO-8859-1"
                    ))
                })
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(self.with_key(bytes, iv))
    }

    pub fn has_key(&self) -> bool {
        self.key.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }

    /// Longest segment rounded up, as EXT-X-TARGETDURATION requires
    pub fn target_duration(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.duration.ceil() as u64)
            .max()
            .unwrap_or(0)
    }

    /// Convert a parsed media playlist fetched from `playlist_url`.
    ///
    /// The key itself is not fetched here; the returned key URI (absolute) is
    /// left to the caller.
    pub fn from_media_playlist(
        media: &MediaPlaylist,
        playlist_url: &Url,
    ) -> Result<(Self, Option<Url>), HlsDownloaderError> {
        let base_url = playlist_url.join(".").map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Failed to determine base URL: {e}"))
        })?;

        let segments = media
            .segments
            .iter()
            .enumerate()
            .map(|(i, seg)| Segment::new(seg.uri.clone(), media.media_sequence + i as u64, seg.duration))
            .collect();

        let mut playlist = Playlist::new(base_url, segments);

        let key_info = media.segments.iter().find_map(|s| s.key.as_ref());
        let key_url = match key_info {
            None => None,
            Some(key) => match &key.method {
                KeyMethod::None => None,
                KeyMethod::AES128 => {
                    let uri = key.uri.as_deref().ok_or_else(|| {
                        HlsDownloaderError::PlaylistError("AES-128 key has no URI".to_string())
                    })?;
                    let key_url = playlist_url.join(uri).map_err(|e| {
                        HlsDownloaderError::PlaylistError(format!(
                            "Could not join playlist URL with key URI {uri}: {e}"
                        ))
                    })?;
                    playlist.iv = key.iv.clone();
                    Some(key_url)
                }
                other => {
                    return Err(HlsDownloaderError::PlaylistError(format!(
                        "Unsupported encryption method: {other:?}"
                    )));
                }
            },
        };

        Ok((playlist, key_url))
    }
}

#[async_trait]
pub trait PlaylistResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Playlist, HlsDownloaderError>;
}

/// Fetches and parses playlists over HTTP with m3u8-rs
pub struct HttpPlaylistResolver {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl HttpPlaylistResolver {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    async fn fetch_bytes(&self, url: &Url, timeout: Duration) -> Result<Bytes, HlsDownloaderError> {
        let response = self
            .http_client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(HlsDownloaderError::PlaylistError(format!(
                "Failed to fetch {url}: HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }

    async fn fetch_media_playlist(
        &self,
        url: Url,
    ) -> Result<(MediaPlaylist, Url), HlsDownloaderError> {
        let timeout = self.config.playlist_fetch_timeout;
        let content = self.fetch_bytes(&url, timeout).await?;
        match parse_playlist_res(&content) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok((pl, url)),
            Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
                let variant = master
                    .variants
                    .iter()
                    .filter(|v| !v.is_i_frame)
                    .max_by_key(|v| v.bandwidth)
                    .ok_or_else(|| {
                        HlsDownloaderError::PlaylistError(
                            "Master playlist has no variants".to_string(),
                        )
                    })?;
                let media_url = url.join(&variant.uri).map_err(|e| {
                    HlsDownloaderError::PlaylistError(format!(
                        "Could not join master URL with variant URI {}: {e}",
                        variant.uri
                    ))
                })?;
                debug!(bandwidth = variant.bandwidth, url = %media_url, "Selected variant");

                let content = self.fetch_bytes(&media_url, timeout).await?;
                match parse_playlist_res(&content) {
                    Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok((pl, media_url)),
                    Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(
                        HlsDownloaderError::PlaylistError(format!(
                            "Variant {media_url} is itself a master playlist"
                        )),
                    ),
                    Err(e) => Err(HlsDownloaderError::PlaylistError(format!(
                        "Failed to parse media playlist {media_url}: {e}"
                    ))),
                }
            }
            Err(e) => Err(HlsDownloaderError::PlaylistError(format!(
                "Failed to parse playlist {url}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl PlaylistResolver for HttpPlaylistResolver {
    async fn resolve(&self, url: &str) -> Result<Playlist, HlsDownloaderError> {
        let playlist_url = Url::parse(url).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Invalid playlist URL {url}: {e}"))
        })?;

        let (media, media_url) = self.fetch_media_playlist(playlist_url).await?;
        if !media.end_list {
            warn!(url = %media_url, "Playlist has no ENDLIST tag, downloading the current window only");
        }

        let (mut playlist, key_url) = Playlist::from_media_playlist(&media, &media_url)?;
        if let Some(key_url) = key_url {
            let key = self
                .fetch_bytes(&key_url, self.config.key_fetch_timeout)
                .await?;
            if key.len() != 16 {
                return Err(HlsDownloaderError::DecryptionError(format!(
                    "Decryption key from {key_url} has incorrect length: {} bytes (expected 16)",
                    key.len()
                )));
            }
            playlist.key = Some(key);
        }

        info!(
            url = %media_url,
            segments = playlist.total_segments(),
            encrypted = playlist.has_key(),
            "Playlist resolved"
        );
        Ok(playlist)
    }
}
