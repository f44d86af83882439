//! MsgPack codec using `rmp-serde`.
//!
//! Structs are written with `to_vec_named`, i.e. as maps keyed by field
//! name. Peers can then add or reorder fields without breaking older
//! readers.
//!
//! # Example
//!
//! ```
//! use framelink::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct BeaconSignal {
//!     seq: u64,
//!     team: String,
//! }
//!
//! let msg = BeaconSignal { seq: 7, team: "cyan".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: BeaconSignal = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
