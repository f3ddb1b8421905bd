// Local naming: save directory per playlist URL and file name per segment.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use sha2::Sha256;

use crate::hls::HlsDownloaderError;
use crate::hls::playlist::Segment;

/// Stable save directory for a playlist URL, so a second run resumes into it
pub fn save_dir_for(root: &Path, url: &str) -> PathBuf {
    root.join(hex::encode(Md5::digest(url.as_bytes())))
}

/// Derives the on-disk file name of a segment.
///
/// `key` is the caller's filename-obfuscation key, not the decryption key.
pub trait SegmentNamer: Send + Sync {
    fn file_name(&self, key: Option<&str>, segment: &Segment) -> Result<String, HlsDownloaderError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HashedSegmentNamer;

impl HashedSegmentNamer {
    fn extension(url: &str) -> Result<&str, HlsDownloaderError> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let last = path.rsplit('/').next().unwrap_or_default();
        match last.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(HlsDownloaderError::NamingError(format!(
                        "Unusable extension in segment URI {url}"
                    )));
                }
                Ok(ext)
            }
            _ => Ok("ts"),
        }
    }
}

impl SegmentNamer for HashedSegmentNamer {
    fn file_name(&self, key: Option<&str>, segment: &Segment) -> Result<String, HlsDownloaderError> {
        let ext = Self::extension(&segment.url)?;
        let base = format!("{}.{ext}", hex::encode(Md5::digest(segment.url.as_bytes())));
        match key.filter(|k| !k.is_empty()) {
            None => Ok(base),
            Some(key) => {
                let mut hasher = Sha256::new();
                hasher.update(key.as_bytes());
                hasher.update(base.as_bytes());
                Ok(format!("{}.{ext}", hex::encode(hasher.finalize())))
            }
        }
    }
}

/// File name derived directly from the raw segment URI
pub fn fallback_file_name(segment: &Segment) -> String {
    let name: String = segment
        .url
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '?' | '#' | '*' | '"' | '<' | '>' | '|' | '&' | '=' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        format!("segment_{}", segment.index)
    } else {
        name
    }
}

/// Local path of a segment inside `dir`, falling back to the raw URI when naming fails
pub fn segment_path(
    namer: &dyn SegmentNamer,
    dir: &Path,
    key: Option<&str>,
    segment: &Segment,
) -> PathBuf {
    match namer.file_name(key, segment) {
        Ok(name) => dir.join(name),
        Err(e) => {
            tracing::debug!(url = %segment.url, error = %e, "Segment naming failed, using raw URI");
            dir.join(fallback_file_name(segment))
        }
    }
}
