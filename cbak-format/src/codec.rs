//! Text-safe encoding for embedded binary blobs (photos)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

/// Encode raw bytes as padded standard base64.
pub fn encode_blob(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text back into raw bytes.
///
/// ASCII whitespace is ignored so line-wrapped encodings decode too.
pub fn decode_blob(text: &str) -> Result<Vec<u8>> {
    if text.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(text)?)
}
