//! Metadata Encoding - Compaction, Base64 and Digests
//!
//! Files under `metadata/` are stored compacted (JSON only) and base64
//! encoded, so every metadata member of a package is plain ASCII.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::IgnoredAny;
use sha2::{Digest, Sha256};

/// Lowercase hex digest reported for a finished package file.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Strip insignificant whitespace from a JSON document.
///
/// Key order, number spelling and string escapes are kept byte for byte;
/// only whitespace between tokens is dropped. The input must be valid JSON.
pub fn compact_json(raw: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::from_slice::<IgnoredAny>(raw)?;

    let mut out = Vec::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for &byte in raw {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b' ' | b'\t' | b'\n' | b'\r' => {}
            b'"' => {
                in_string = true;
                out.push(byte);
            }
            _ => out.push(byte),
        }
    }

    Ok(out)
}

/// Apply the metadata transform: compact if JSON, then base64.
pub fn encode_metadata(raw: &[u8], is_json: bool) -> Result<Vec<u8>, serde_json::Error> {
    let encoded = if is_json {
        STANDARD.encode(compact_json(raw)?)
    } else {
        STANDARD.encode(raw)
    };
    Ok(encoded.into_bytes())
}

/// Undo the base64 step of [`encode_metadata`].
pub fn decode_metadata(encoded: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
