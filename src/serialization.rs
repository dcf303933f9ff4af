//! Versioned binary envelope for cached values.
//!
//! # Format
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes, little endian] [POSTCARD PAYLOAD]
//! ```
//!
//! Single-item entries store `Option<T>` so that a confirmed absence can be
//! cached alongside present records. Collection entries store `Vec<T>`.
//!
//! Postcard is not self-describing: entity types must not rely on
//! `#[serde(untagged)]`, `#[serde(flatten)]` or `skip_serializing_if`.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Envelope magic.
pub const CACHE_MAGIC: [u8; 4] = *b"CTLG";

/// Bump whenever the layout of a cached entity changes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Serialize a value into a versioned cache envelope.
pub fn serialize_for_cache<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let payload =
        postcard::to_allocvec(value).map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Validate the envelope and deserialize its payload.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: too short or bad magic
/// - `Error::VersionMismatch`: written by another schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry is {} bytes, shorter than the envelope header",
            bytes.len()
        )));
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry("bad magic".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&header[4..]);
    let found = u32::from_le_bytes(version);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}
