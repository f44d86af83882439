//! Integration tests for framelink.
//!
//! These tests verify the integration between the wire format, codecs,
//! and registries without a live connection.

use bytes::Bytes;
use framelink::codec::MsgPackCodec;
use framelink::protocol::{build_frame, decode_header, FrameHeader, InboundBuffer, HEADER_SIZE};
use framelink::registry::{AnyMessage, MessageRegistry, RawRegistry, TypedRegistry};
use framelink::{ClientConfig, FramelinkError, PreConnectPolicy};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Position {
    x: f64,
    y: f64,
    label: String,
}

/// Split a stream of concatenated frames the way the receive loop does.
fn split_frames(mut bytes: &[u8], buffer: &mut InboundBuffer) -> Vec<(FrameHeader, Vec<u8>)> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let header = decode_header(bytes).unwrap();
        bytes = &bytes[HEADER_SIZE..];

        let len = header.payload_len();
        buffer.prepare(&header).unwrap().copy_from_slice(&bytes[..len]);
        frames.push((header, buffer.filled(len).to_vec()));
        bytes = &bytes[len..];
    }
    frames
}

/// Test full frame encode/decode cycle with a typed payload.
#[test]
fn test_frame_with_typed_payload() {
    let mut registry = TypedRegistry::new();
    registry.register::<Position>(3, 7);

    let position = Position {
        x: 1.5,
        y: -2.0,
        label: "home".to_string(),
    };
    let payload = registry
        .serialize(3, 7, &AnyMessage::new(position))
        .unwrap();
    let frame = build_frame(3, 7, &payload).unwrap();

    assert_eq!(&frame[..4], &[0, 3, 0, 7]);
    assert_eq!(frame.len(), HEADER_SIZE + payload.len());

    let mut buffer = InboundBuffer::new();
    let frames = split_frames(&frame, &mut buffer);
    assert_eq!(frames.len(), 1);

    let (header, payload) = &frames[0];
    let message = registry.deserialize(header, payload).unwrap();
    let decoded = message.downcast::<Position>().unwrap();
    assert_eq!(decoded.label, "home");
    assert_eq!(decoded.x, 1.5);
}

/// Test multiple frames in sequence, including an empty payload.
#[test]
fn test_multiple_frames_sequence() {
    let mut all_bytes = Vec::new();
    for i in 0u16..5 {
        let payload = MsgPackCodec::encode(&format!("message_{}", i)).unwrap();
        all_bytes.extend(build_frame(1, i, &payload).unwrap());
    }
    all_bytes.extend(build_frame(2, 20, &[]).unwrap());

    let mut buffer = InboundBuffer::with_capacity_and_max_payload(4, 1024);
    let frames = split_frames(&all_bytes, &mut buffer);
    assert_eq!(frames.len(), 6);

    for (i, (header, payload)) in frames.iter().take(5).enumerate() {
        assert_eq!(header.component_id, 1);
        assert_eq!(header.message_type, i as u16);
        let decoded: String = MsgPackCodec::decode(payload).unwrap();
        assert_eq!(decoded, format!("message_{}", i));
    }

    let (header, payload) = &frames[5];
    assert_eq!(*header, FrameHeader::new(2, 20, 0));
    assert!(payload.is_empty());
    // Grew for the strings, never shrank for the empty frame.
    assert!(buffer.capacity() > 4);
}

#[test]
fn test_raw_registry_passes_bytes_through() {
    let registry = RawRegistry;
    let payload = registry
        .serialize(9, 9, &Bytes::from_static(b"\x00\xffraw"))
        .unwrap();
    let frame = build_frame(9, 9, &payload).unwrap();

    let header = decode_header(&frame).unwrap();
    let message = registry
        .deserialize(&header, &frame[HEADER_SIZE..])
        .unwrap();
    assert_eq!(&message[..], b"\x00\xffraw");
}

#[test]
fn test_inbound_ceiling_rejects_announced_size() {
    let mut buffer = InboundBuffer::with_capacity_and_max_payload(16, 1024);
    let header = decode_header(&[0, 1, 0, 1, 0, 0, 0x10, 0]).unwrap();

    assert_eq!(header.payload_size, 4096);
    let err = buffer.prepare(&header).unwrap_err();
    assert!(matches!(
        err,
        FramelinkError::PayloadTooLarge { size: 4096, max: 1024 }
    ));
    assert_eq!(buffer.capacity(), 16);
}

#[test]
fn test_typed_registry_errors() {
    let mut registry = TypedRegistry::new();
    registry.register::<Position>(1, 1);

    let err = registry
        .serialize(1, 2, &AnyMessage::new(0u8))
        .unwrap_err();
    assert!(matches!(
        err,
        FramelinkError::UnknownMessageType { component_id: 1, message_type: 2 }
    ));

    let err = registry
        .serialize(1, 1, &AnyMessage::new("not a position"))
        .unwrap_err();
    assert!(matches!(err, FramelinkError::Encoding(_)));

    let header = FrameHeader::new(1, 1, 1);
    let err = registry.deserialize(&header, &[0xc1]).unwrap_err();
    assert!(matches!(err, FramelinkError::Decoding(_)));
}

#[test]
fn test_config_from_json() {
    let config: ClientConfig = serde_json::from_str(
        r#"{
            "max_payload_size": 65536,
            "max_queued_frames": 128,
            "pre_connect": "reject"
        }"#,
    )
    .unwrap();

    assert_eq!(config.max_payload_size, 65536);
    assert_eq!(config.max_queued_frames, 128);
    assert_eq!(config.pre_connect, PreConnectPolicy::Reject);
    assert_eq!(config, ClientConfig {
        max_payload_size: 65536,
        max_queued_frames: 128,
        pre_connect: PreConnectPolicy::Reject,
        ..ClientConfig::default()
    });
}
