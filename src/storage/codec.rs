//! Binary encoding of stored values
//!
//! Blocks and output sets are stored with bincode's standard
//! configuration. Decoding is strict: malformed input, over-long
//! length prefixes and trailing bytes are all reported as corruption.

use bincode::config::{self, Config};
use bincode::{Decode, Encode};

use super::store::StorageError;

/// Upper bound on bytes a single decode may claim
const MAX_DECODE_BYTES: usize = 64 * 1024 * 1024;

fn codec_config() -> impl Config {
    config::standard().with_limit::<MAX_DECODE_BYTES>()
}

pub fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::encode_to_vec(value, codec_config()).map_err(|e| StorageError::Encode(e.to_string()))
}

pub fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, StorageError> {
    let (value, read) = bincode::decode_from_slice(bytes, codec_config())
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;

    if read != bytes.len() {
        return Err(StorageError::Corrupt(format!(
            "{} trailing bytes after value",
            bytes.len() - read
        )));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Sample {
        id: Vec<u8>,
        value: u64,
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = encode(&Sample {
            id: vec![1, 2, 3, 4],
            value: 99,
        })
        .unwrap();

        let result: Result<Sample, _> = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&Sample {
            id: vec![],
            value: 1,
        })
        .unwrap();
        bytes.push(0);

        let result: Result<Sample, _> = decode(&bytes);
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }
}
