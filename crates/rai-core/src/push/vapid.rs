//! VAPID application server key handling

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{CoreError, Result};

/// Length of an uncompressed P-256 public key
const UNCOMPRESSED_KEY_LEN: usize = 65;

/// Decode the server's public key into the raw bytes the push service wants.
///
/// Accepts base64url with or without padding, and tolerates the standard
/// alphabet. The result must be an uncompressed P-256 point.
pub fn decode_application_server_key(key: &str) -> Result<Vec<u8>> {
    let normalized: String = key
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    if normalized.is_empty() {
        return Err(CoreError::ServerMisconfigured(
            "push public key is empty".to_string(),
        ));
    }

    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes()).map_err(|e| {
        CoreError::ServerMisconfigured(format!("push public key is not base64url: {}", e))
    })?;

    if bytes.len() != UNCOMPRESSED_KEY_LEN || bytes[0] != 0x04 {
        return Err(CoreError::ServerMisconfigured(format!(
            "push public key is not an uncompressed P-256 point ({} bytes)",
            bytes.len()
        )));
    }

    Ok(bytes)
}
