//! Value encoding for Vault.
//!
//! Vault secrets only hold strings, so blobs are stored as
//! bytes -> zlib -> base64 (standard alphabet, padded).

use std::io::{ErrorKind, Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tfstate_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Compress `data` and return its base64 representation.
pub fn encode(data: &[u8]) -> Result<String, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    Ok(STANDARD.encode(compressed))
}

/// Decode and decompress a value produced by [`encode`].
///
/// Also accepts streams that stop after a sync flush, without the final
/// block and checksum: whatever was decoded before the end of input is
/// returned.
pub fn decode(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let compressed = STANDARD.decode(encoded.trim_end())?;

    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut data = Vec::new();
    match decoder.read_to_end(&mut data) {
        Ok(_) => Ok(data),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(data),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic non-text bytes (xorshift).
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x9e37_79b9;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_encode_decode() {
        let data = b"This is a test string...";

        let enc = encode(data).unwrap();
        assert!(enc.is_ascii());

        assert_eq!(decode(&enc).unwrap(), data);
    }

    #[test]
    fn test_encode_decode_bin() {
        let data = noise(1024);

        let enc = encode(&data).unwrap();
        assert_eq!(decode(&enc).unwrap(), data);
    }

    #[test]
    fn test_encode_decode_empty() {
        let enc = encode(b"").unwrap();
        assert!(!enc.is_empty());
        assert!(decode(&enc).unwrap().is_empty());
    }

    #[test]
    fn test_decode_sync_flushed_stream() {
        // A writer that was flushed but never finished: no final block, no checksum.
        let data = br#"{"version": 4, "serial": 12, "resources": []}"#;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.flush().unwrap();
        let truncated = STANDARD.encode(encoder.get_ref());

        assert_eq!(decode(&truncated).unwrap(), data);
    }

    #[test]
    fn test_decode_stream_missing_unencoded_tail() {
        // A base64 writer that was never closed drops the last `len % 3`
        // bytes of the sync-flushed stream; they belong to the flush marker.
        for len in [0, 1, 2, 3, 10, 45, 1000] {
            let data = noise(len);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data).unwrap();
            encoder.flush().unwrap();

            let raw = encoder.get_ref();
            let cut = &raw[..raw.len() - raw.len() % 3];
            let encoded = STANDARD.encode(cut);

            assert_eq!(decode(&encoded).unwrap(), data, "length {}", len);
        }
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(matches!(decode("not base64!"), Err(CodecError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_corrupt_stream() {
        let garbage = STANDARD.encode(b"definitely not zlib");
        assert!(matches!(decode(&garbage), Err(CodecError::Compression(_))));
    }
}
