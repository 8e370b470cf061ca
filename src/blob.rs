//! Out-of-band reproduction blobs.
//!
//! A failing buffer can be printed as a short base64 string and pasted back
//! into source to replay exactly that failure. Blobs carry no compatibility
//! promise across engine versions: callers pass the version the blob was
//! printed by, and a mismatch is refused.
//!
//! Layout: one format byte (`0`, raw buffer) followed by the buffer, base64
//! encoded with the standard alphabet.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::BlobError;

/// Version string blobs are tagged with.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

const FORMAT_RAW: u8 = 0;

pub fn encode_failure(buffer: &[u8]) -> String {
    let mut payload = Vec::with_capacity(buffer.len() + 1);
    payload.push(FORMAT_RAW);
    payload.extend_from_slice(buffer);
    STANDARD.encode(payload)
}

pub fn decode_failure(blob: &str) -> Result<Vec<u8>, BlobError> {
    let payload = STANDARD.decode(blob.trim())?;
    match payload.split_first() {
        None => Err(BlobError::Empty),
        Some((&FORMAT_RAW, buffer)) => Ok(buffer.to_vec()),
        Some((&format, _)) => Err(BlobError::UnknownFormat(format)),
    }
}

/// Decodes a blob printed by engine `version`, refusing other versions.
pub fn decode_versioned(version: &str, blob: &str) -> Result<Vec<u8>, BlobError> {
    if version != ENGINE_VERSION {
        return Err(BlobError::VersionMismatch {
            expected: ENGINE_VERSION.to_string(),
            found: version.to_string(),
        });
    }
    decode_failure(blob)
}
