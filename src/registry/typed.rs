//! Registry of Rust message types keyed by (component id, message type).
//!
//! Each registered type is encoded with [`MsgPackCodec`]. Messages travel
//! through the session as [`AnyMessage`], a type-erased box the
//! application downcasts after receipt.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::MessageRegistry;
use crate::codec::MsgPackCodec;
use crate::error::{FramelinkError, Result};
use crate::protocol::FrameHeader;

/// A type-erased message.
pub struct AnyMessage {
    inner: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl AnyMessage {
    /// Wrap a concrete message.
    pub fn new<T: Any + Send + Sync>(message: T) -> Self {
        Self {
            inner: Box::new(message),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the wrapped Rust type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check whether the wrapped value is a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrow the wrapped value as `T`.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Take the wrapped value as `T`, or get `self` back on mismatch.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        let type_name = self.type_name;
        self.inner
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|inner| Self { inner, type_name })
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyMessage")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Encoder/decoder for one registered type.
trait ErasedCodec: Send + Sync + 'static {
    fn encode(&self, message: &AnyMessage) -> Result<Vec<u8>>;
    fn decode(&self, payload: &[u8]) -> Result<AnyMessage>;
    fn type_name(&self) -> &'static str;
}

struct TypedCodec<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> TypedCodec<T> {
    fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> ErasedCodec for TypedCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, message: &AnyMessage) -> Result<Vec<u8>> {
        let value = message.downcast_ref::<T>().ok_or_else(|| {
            FramelinkError::Encoding(format!(
                "expected {}, got {}",
                type_name::<T>(),
                message.type_name()
            ))
        })?;

        MsgPackCodec::encode(value)
            .map_err(|e| FramelinkError::Encoding(format!("{}: {}", type_name::<T>(), e)))
    }

    fn decode(&self, payload: &[u8]) -> Result<AnyMessage> {
        let value: T = MsgPackCodec::decode(payload)
            .map_err(|e| FramelinkError::Decoding(format!("{}: {}", type_name::<T>(), e)))?;
        Ok(AnyMessage::new(value))
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Registry mapping (component id, message type) pairs to Rust types.
#[derive(Default)]
pub struct TypedRegistry {
    codecs: HashMap<(u16, u16), Box<dyn ErasedCodec>>,
}

impl TypedRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register `T` for the given pair, replacing any previous type.
    pub fn register<T>(&mut self, component_id: u16, message_type: u16) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let previous = self
            .codecs
            .insert((component_id, message_type), Box::new(TypedCodec::<T>::new()));
        if let Some(previous) = previous {
            tracing::debug!(
                component_id,
                message_type,
                "replacing registered type {} with {}",
                previous.type_name(),
                type_name::<T>()
            );
        }
        self
    }

    /// Check whether a pair has a registered type.
    pub fn is_registered(&self, component_id: u16, message_type: u16) -> bool {
        self.codecs.contains_key(&(component_id, message_type))
    }

    /// Name of the Rust type registered for a pair.
    pub fn registered_type(&self, component_id: u16, message_type: u16) -> Option<&'static str> {
        self.codecs
            .get(&(component_id, message_type))
            .map(|codec| codec.type_name())
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    fn codec(&self, component_id: u16, message_type: u16) -> Result<&dyn ErasedCodec> {
        self.codecs
            .get(&(component_id, message_type))
            .map(|codec| codec.as_ref())
            .ok_or(FramelinkError::UnknownMessageType {
                component_id,
                message_type,
            })
    }
}

impl MessageRegistry for TypedRegistry {
    type Message = AnyMessage;

    fn serialize(
        &self,
        component_id: u16,
        message_type: u16,
        message: &AnyMessage,
    ) -> Result<Bytes> {
        let codec = self.codec(component_id, message_type)?;
        Ok(Bytes::from(codec.encode(message)?))
    }

    fn deserialize(&self, header: &FrameHeader, payload: &[u8]) -> Result<AnyMessage> {
        self.codec(header.component_id, header.message_type)?
            .decode(payload)
    }
}

impl fmt::Debug for TypedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, codec) in &self.codecs {
            map.entry(key, &codec.type_name());
        }
        map.finish()
    }
}
