//! Raw codec - pass-through for binary data.
//!
//! Used when payload bytes are produced and consumed by the application
//! itself. Provides zero-copy operations where possible.
//!
//! # Example
//!
//! ```
//! use framelink::codec::RawCodec;
//! use bytes::Bytes;
//!
//! let received = RawCodec::deserialize(b"binary payload");
//! assert_eq!(&received[..], b"binary payload");
//!
//! let bytes = Bytes::from_static(b"zero copy");
//! let passed = RawCodec::serialize_bytes(bytes.clone());
//! assert_eq!(passed.as_ptr(), bytes.as_ptr());
//! ```

use bytes::Bytes;

/// Raw codec that passes bytes through without transformation.
pub struct RawCodec;

impl RawCodec {
    /// Serialize Bytes (zero-copy, just returns the input).
    #[inline]
    pub fn serialize_bytes(data: Bytes) -> Bytes {
        data
    }

    /// Deserialize into owned Bytes (copies out of the borrowed slice).
    #[inline]
    pub fn deserialize(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_round_trip() {
        let serialized = RawCodec::serialize_bytes(Bytes::from_static(b"hello world"));
        assert_eq!(RawCodec::deserialize(&serialized), &b"hello world"[..]);
    }

    #[test]
    fn test_serialize_empty() {
        let serialized = RawCodec::serialize_bytes(Bytes::new());
        assert!(serialized.is_empty());
        assert!(RawCodec::deserialize(&serialized).is_empty());
    }

    #[test]
    fn test_serialize_bytes_zero_copy() {
        let original = Bytes::from_static(b"static data");
        let serialized = RawCodec::serialize_bytes(original.clone());

        assert_eq!(serialized.as_ptr(), original.as_ptr());
        assert_eq!(serialized.len(), original.len());
    }

    #[test]
    fn test_deserialize_owns_its_data() {
        let mut scratch = vec![1u8, 2, 3];
        let owned = RawCodec::deserialize(&scratch);
        scratch[0] = 9;

        assert_eq!(&owned[..], &[1, 2, 3]);
    }

    #[test]
    fn test_binary_data_preserved() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let serialized = RawCodec::serialize_bytes(Bytes::from(all_bytes.clone()));
        assert_eq!(&RawCodec::deserialize(&serialized)[..], &all_bytes[..]);
    }
}
