use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Encodes a value into the binary record format used for persisted data
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

/// Decodes a value previously written with [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

/// SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Feeds a variable-length field into a digest.
///
/// The field is prefixed with its length as a big-endian `u64` so that two
/// different field splits can never produce the same digest input.
pub fn put_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let value = (42u64, vec![1u8, 2, 3], -1i64);
        let bytes = encode(&value).unwrap();
        let decoded: (u64, Vec<u8>, i64) = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<(u64, Vec<u8>), _> = decode(&[0xff]);
        assert!(result.is_err());
    }

    #[test]
    fn test_put_field_is_length_framed() {
        let mut left = Sha256::new();
        put_field(&mut left, b"ab");
        put_field(&mut left, b"c");

        let mut right = Sha256::new();
        put_field(&mut right, b"a");
        put_field(&mut right, b"bc");

        assert_ne!(left.finalize(), right.finalize());
    }

    #[test]
    fn test_sha256_length() {
        assert_eq!(sha256(b"ledger").len(), 32);
    }
}
