//! Payload decoding: Base64 → GZIP → UTF-8 JSON string.

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

/// Ceiling on decompressed payload size. Upstream producers stay far
/// below this; anything larger is treated as a corrupt stream.
const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub enum DecodeError {
    EmptyInput,
    BadBase64(String),
    BadGzip(String),
    BadUtf8(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::EmptyInput => write!(f, "empty payload"),
            DecodeError::BadBase64(e) => write!(f, "base64 decode error: {}", e),
            DecodeError::BadGzip(e) => write!(f, "gzip decompress error: {}", e),
            DecodeError::BadUtf8(e) => write!(f, "utf-8 decode error: {}", e),
        }
    }
}

/// Decode an object's raw bytes into the JSON string it carries.
///
/// Expected layout is ASCII Base64 (standard alphabet, padded) of a GZIP
/// stream of UTF-8 JSON. No JSON parsing happens here. All failures are
/// permanent: a payload that does not decode will never decode.
pub fn decode(raw: &[u8]) -> Result<String, DecodeError> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let compressed = STANDARD
        .decode(trimmed)
        .map_err(|e| DecodeError::BadBase64(e.to_string()))?;

    let decompressed = gunzip(&compressed)?;
    debug!(
        compressed_size = compressed.len(),
        decompressed_size = decompressed.len(),
        "payload decompressed"
    );

    String::from_utf8(decompressed).map_err(|e| DecodeError::BadUtf8(e.to_string()))
}

/// GZIP-decompress with the size ceiling enforced.
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::with_capacity(compressed.len().saturating_mul(4));
    let bytes_read = decoder
        .take((MAX_DECOMPRESSED_SIZE + 1) as u64)
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::BadGzip(e.to_string()))?;
    if bytes_read > MAX_DECOMPRESSED_SIZE {
        return Err(DecodeError::BadGzip(format!(
            "decompressed size exceeds {} byte limit",
            MAX_DECOMPRESSED_SIZE
        )));
    }
    Ok(decompressed)
}
