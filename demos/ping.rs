//! Ping - connect, send a few typed messages, print whatever comes back.
//!
//! This example demonstrates:
//! - Registering message types with a `TypedRegistry`
//! - Receiving session events through a `ChannelSink`
//! - Sending from the application thread while the I/O worker runs
//!
//! # Running
//!
//! Start any server that echoes frames back (header included), then:
//!
//! ```text
//! RUST_LOG=framelink=debug cargo run --example ping -- 127.0.0.1 7000
//! ```

use framelink::{AnyMessage, ChannelSink, Client, ClientEvent, TypedRegistry};
use serde::{Deserialize, Serialize};

const COMPONENT: u16 = 1;
const PING: u16 = 10;

/// Payload for the ping message.
#[derive(Serialize, Deserialize, Debug)]
struct Ping {
    seq: u32,
    note: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("7000").parse()?;

    let mut registry = TypedRegistry::new();
    registry.register::<Ping>(COMPONENT, PING);

    let (sink, mut events) = ChannelSink::new();
    let client = Client::builder(registry).sink(sink).build()?;

    // Queued until the connection is up.
    for seq in 0..3 {
        let ping = Ping {
            seq,
            note: format!("ping #{}", seq),
        };
        client.send(COMPONENT, PING, &AnyMessage::new(ping))?;
    }
    client.async_connect(&host, port)?;

    let mut replies = 0;
    while let Some(event) = events.blocking_recv() {
        match event {
            ClientEvent::Connected => println!("connected to {}:{}", host, port),
            ClientEvent::Message {
                component_id,
                message_type,
                message,
            } => {
                match message {
                    Ok(message) => match message.downcast_ref::<Ping>() {
                        Some(ping) => println!("reply: {:?}", ping),
                        None => println!("reply ({}, {}): {:?}", component_id, message_type, message),
                    },
                    Err(e) => println!("undecodable ({}, {}): {}", component_id, message_type, e),
                }
                replies += 1;
                if replies == 3 {
                    client.disconnect();
                }
            }
            ClientEvent::Disconnected(disconnect) => {
                println!("disconnected: {}", disconnect);
                break;
            }
        }
    }

    Ok(())
}
