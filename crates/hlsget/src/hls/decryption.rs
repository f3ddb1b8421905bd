// AES-128-CBC segment decryption.

use aes::Aes128;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use tracing::debug;

use crate::hls::HlsDownloaderError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Resolve the playlist IV attribute into 16 bytes.
///
/// `0x`-prefixed values are hex-decoded, anything else is taken as raw bytes.
/// A value that does not yield exactly 16 bytes becomes the all-zero IV.
pub fn resolve_iv(iv: Option<&str>) -> [u8; 16] {
    let mut iv_bytes = [0u8; 16];
    let Some(iv) = iv.filter(|s| !s.is_empty()) else {
        return iv_bytes;
    };

    let decoded = match iv.strip_prefix("0x").or_else(|| iv.strip_prefix("0X")) {
        Some(hex_part) => hex::decode(hex_part).ok(),
        None => Some(iv.as_bytes().to_vec()),
    };

    match decoded {
        Some(bytes) if bytes.len() == 16 => iv_bytes.copy_from_slice(&bytes),
        _ => debug!(iv, "IV is not 16 bytes, using the zero IV"),
    }
    iv_bytes
}

/// Decrypt one whole segment, stripping PKCS#7 padding
pub fn decrypt_segment(
    data: Vec<u8>,
    key: &[u8],
    iv: &[u8; 16],
) -> Result<Vec<u8>, HlsDownloaderError> {
    let mut buffer = data;
    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        HlsDownloaderError::DecryptionError(format!("Failed to initialize AES decryptor: {e}"))
    })?;

    let decrypted_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| HlsDownloaderError::DecryptionError(format!("Decryption failed: {e}")))?
        .len();

    buffer.truncate(decrypted_len);
    Ok(buffer)
}
