//! Payload compression for `RESULT` attributes.
//!
//! Payloads are serialized to JSON and compressed with zstd.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SyncError;

const LEVEL: i32 = 3;

/// Serialize `value` to JSON and compress it.
pub fn compress_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SyncError> {
    let raw = serde_json::to_vec(value).map_err(|e| SyncError::Payload(e.to_string()))?;
    zstd::encode_all(raw.as_slice(), LEVEL).map_err(|e| SyncError::Payload(e.to_string()))
}

/// Inverse of [`compress_json`].
pub fn decompress_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SyncError> {
    let raw = zstd::decode_all(bytes).map_err(|e| SyncError::Payload(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| SyncError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_payload_restores() {
        let value = serde_json::json!({
            "number": "0x10",
            "transactions": ["0xaa", "0xbb"],
            "transactionsTotal": 2
        });
        let bytes = compress_json(&value).unwrap();
        let back: serde_json::Value = decompress_json(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn garbage_input_is_a_payload_error() {
        let err = decompress_json::<serde_json::Value>(b"not zstd").unwrap_err();
        assert!(matches!(err, SyncError::Payload(_)));
    }
}
