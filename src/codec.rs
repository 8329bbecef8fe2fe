//! Codec Layer (C2): deterministic key derivation and transparent payload
//! compression, §4.2.

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::error;

use crate::entry::CacheBody;
use crate::error::{CacheError, Result};

/// Derive the Translation cache key: `src:tgt:context:md5hex(text)` (§4.2, P1).
#[must_use]
pub fn translation_key(source_lang: &str, target_lang: &str, context: &str, text: &str) -> String {
    let digest = md5::compute(text.as_bytes());
    format!("{source_lang}:{target_lang}:{context}:{digest:x}")
}

/// Outcome of applying the compression policy to a serialized body.
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub is_compressed: bool,
    pub original_size: usize,
    pub stored_size: usize,
}

/// Serialize a `CacheBody` to canonical JSON and apply the compression
/// policy (§4.2): only stored compressed if strictly smaller than the
/// uncompressed form.
pub fn encode(
    body: &CacheBody,
    force_compress: bool,
    compression_enabled: bool,
    threshold: usize,
    level: u32,
) -> Result<EncodedPayload> {
    let json = serde_json::to_vec(body).map_err(|e| CacheError::Codec(e.to_string()))?;
    let original_size = json.len();

    let should_attempt = force_compress || (compression_enabled && original_size > threshold);

    if !should_attempt {
        return Ok(EncodedPayload {
            stored_size: original_size,
            bytes: json,
            is_compressed: false,
            original_size,
        });
    }

    match deflate(&json, level) {
        Ok(compressed) if compressed.len() < original_size => Ok(EncodedPayload {
            stored_size: compressed.len(),
            bytes: compressed,
            is_compressed: true,
            original_size,
        }),
        Ok(_) => Ok(EncodedPayload {
            stored_size: original_size,
            bytes: json,
            is_compressed: false,
            original_size,
        }),
        Err(e) => {
            error!("compression failed, storing uncompressed: {}", e);
            Ok(EncodedPayload {
                stored_size: original_size,
                bytes: json,
                is_compressed: false,
                original_size,
            })
        }
    }
}

/// Decode a stored payload back into a `CacheBody`. On any decompression or
/// parse failure this logs and returns `CacheError::Codec` (callers decide
/// whether to surface the raw bytes instead); the Engine never panics here.
pub fn decode(payload: &[u8], is_compressed: bool) -> Result<CacheBody> {
    let json_bytes = if is_compressed {
        match inflate(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("decompression failed: {}", e);
                return Err(CacheError::Codec(e.to_string()));
            }
        }
    } else {
        payload.to_vec()
    };

    serde_json::from_slice(&json_bytes).map_err(|e| {
        error!("decode failed: {}", e);
        CacheError::Codec(e.to_string())
    })
}

fn deflate(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
