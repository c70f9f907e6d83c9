//! Shared harness: a scripted firmware on the far end of an in-memory
//! duplex link.

#![allow(dead_code)]

use std::sync::Once;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use znp_link::framing::DecodeEvent;
use znp_link::schema::command_by_name;
use znp_link::{CodecKind, Direction, Driver, Frame, Payload, Subsystem, ZnpObject};

static TRACING: Once = Once::new();

/// Frame traffic shows up under `RUST_LOG=znp_link=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Encode a synchronous reply for a named command.
pub fn reply(subsystem: Subsystem, name: &str, payload: Payload) -> Frame {
    let object = ZnpObject {
        direction: Direction::Srsp,
        subsystem,
        command: command_by_name(subsystem, name).unwrap(),
        payload,
    };
    object.to_frame().unwrap()
}

/// Encode an unsolicited indication for a named command.
pub fn indication(subsystem: Subsystem, name: &str, payload: Payload) -> Frame {
    let object = ZnpObject {
        direction: Direction::Areq,
        subsystem,
        command: command_by_name(subsystem, name).unwrap(),
        payload,
    };
    object.to_frame().unwrap()
}

/// Standard reply carrying only a status byte.
pub fn status_reply(subsystem: Subsystem, name: &str, status: u8) -> Frame {
    reply(subsystem, name, Payload::new().with("status", status))
}

/// Data-transmission confirmation for one transaction.
pub fn data_confirm(status: u8, endpoint: u8, transaction_id: u8) -> Frame {
    indication(
        Subsystem::Af,
        "dataConfirm",
        Payload::new()
            .with("status", status)
            .with("endpoint", endpoint)
            .with("transid", transaction_id),
    )
}

/// Run a scripted firmware over one end of a duplex stream.
///
/// Every decoded request is handed to `handler`, which returns the frames
/// to send back, in order. Undecodable traffic fails the test.
pub fn spawn_firmware(
    stream: DuplexStream,
    kind: CodecKind,
    mut handler: impl FnMut(&ZnpObject) -> Vec<Frame> + Send + 'static,
) {
    tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut codec = kind.codec();
        let mut buf = [0u8; 1024];
        let mut events = Vec::new();
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            codec.push(&buf[..n], &mut events);
            for event in events.drain(..) {
                let frame = match event {
                    DecodeEvent::Frame(frame) => frame,
                    DecodeEvent::Error(err) => panic!("firmware received bad frame: {err}"),
                };
                let request = ZnpObject::from_frame(&frame).unwrap();
                for response in handler(&request) {
                    let mut dst = BytesMut::new();
                    codec.encode(&response, &mut dst).unwrap();
                    writer.write_all(&dst).await.unwrap();
                }
            }
        }
    });
}

/// Wire a driver to a scripted firmware over an in-memory link.
pub fn harness(
    kind: CodecKind,
    handler: impl FnMut(&ZnpObject) -> Vec<Frame> + Send + 'static,
) -> Driver {
    init_tracing();
    let (client, server) = tokio::io::duplex(4096);
    spawn_firmware(server, kind, handler);
    let (reader, writer) = tokio::io::split(client);
    Driver::new(reader, writer, kind)
}
