//! Gzip helpers for raw payload persistence.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use replaylens_core::StorageError;
use serde::Serialize;

/// Serialize `value` as JSON and gzip it.
pub fn gzip_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    let json = serde_json::to_vec(value).map_err(|e| StorageError::Compression {
        reason: format!("payload serialization failed: {}", e),
    })?;
    gzip(&json)
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity((bytes.len() / 4).max(256)),
        Compression::default(),
    );
    encoder
        .write_all(bytes)
        .map_err(|e| StorageError::Compression {
            reason: e.to_string(),
        })?;
    encoder.finish().map_err(|e| StorageError::Compression {
        reason: e.to_string(),
    })
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut decoder = GzDecoder::new(std::io::Cursor::new(bytes));
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StorageError::Compression {
            reason: e.to_string(),
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_has_magic_header() {
        let bytes = gzip_json(&serde_json::json!({"total_match_time_s": 10})).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        let plain = gunzip(&bytes).unwrap();
        assert_eq!(plain, br#"{"total_match_time_s":10}"#);
    }

    #[test]
    fn test_gunzip_rejects_garbage() {
        assert!(matches!(
            gunzip(b"not gzip"),
            Err(StorageError::Compression { .. })
        ));
    }
}
