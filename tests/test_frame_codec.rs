//! Wire codec behavior under arbitrary transport chunking
//!
//! The decoder must produce the same frames no matter how the byte stream
//! is split into transport reads.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use stomp_session::protocol::{Command, Frame, FrameCodec, FrameDecoder, ProtocolError};

#[derive(Debug, Clone)]
enum Unit {
    Heartbeat,
    Message {
        destination: String,
        message_id: String,
        body: Vec<u8>,
    },
    Receipt(String),
}

impl Unit {
    fn frame(&self) -> Frame {
        match self {
            Unit::Heartbeat => Frame::heartbeat(),
            Unit::Message {
                destination,
                message_id,
                body,
            } => Frame::new(Command::Message)
                .header("destination", destination.as_str())
                .header("message-id", message_id.as_str())
                .body(Bytes::from(body.clone())),
            Unit::Receipt(id) => Frame::new(Command::Receipt).header("receipt-id", id.as_str()),
        }
    }

    fn matches(&self, frame: &Frame) -> bool {
        match self {
            Unit::Heartbeat => frame.is_heartbeat(),
            Unit::Message {
                destination,
                message_id,
                body,
            } => {
                frame.command() == Command::Message
                    && frame.destination() == Some(destination.as_str())
                    && frame.message_id() == Some(message_id.as_str())
                    && &frame.payload()[..] == body.as_slice()
            }
            Unit::Receipt(id) => {
                frame.command() == Command::Receipt && frame.receipt_id() == Some(id.as_str())
            }
        }
    }
}

fn unit_strategy() -> impl Strategy<Value = Unit> {
    prop_oneof![
        Just(Unit::Heartbeat),
        (
            "/[a-z0-9:/\\\\]{1,24}",
            "[a-z0-9-]{1,12}",
            prop::collection::vec(any::<u8>(), 0..64)
        )
            .prop_map(|(destination, message_id, body)| Unit::Message {
                destination,
                message_id,
                body
            }),
        "rcpt-[0-9]{1,4}".prop_map(Unit::Receipt),
    ]
}

fn decode_chunked(wire: &[u8], chunk_sizes: &[usize]) -> Result<Vec<Frame>, ProtocolError> {
    let mut decoder = FrameDecoder::default();
    let mut frames = Vec::new();
    let mut offset = 0;
    let mut sizes = chunk_sizes.iter().cycle();

    while offset < wire.len() {
        let size = (*sizes.next().unwrap_or(&1)).max(1);
        let end = (offset + size).min(wire.len());
        decoder.push(&wire[offset..end]);
        offset = end;
        while let Some(frame) = decoder.next_frame()? {
            frames.push(frame);
        }
    }
    Ok(frames)
}

proptest! {
    #[test]
    fn decoded_frames_independent_of_chunking(
        units in prop::collection::vec(unit_strategy(), 1..12),
        chunk_sizes in prop::collection::vec(1usize..40, 1..16),
    ) {
        let mut wire = BytesMut::new();
        for unit in &units {
            wire.extend_from_slice(&FrameCodec::encode(&unit.frame()));
        }

        let frames = decode_chunked(&wire, &chunk_sizes).unwrap();

        prop_assert_eq!(frames.len(), units.len());
        for (unit, frame) in units.iter().zip(&frames) {
            prop_assert!(unit.matches(frame), "{:?} decoded as {:?}", unit, frame);
        }
    }

    #[test]
    fn decoder_never_panics_on_garbage(
        garbage in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut decoder = FrameDecoder::new(128);
        decoder.push(&garbage);
        for _ in 0..garbage.len() + 1 {
            match decoder.next_frame() {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }
}

#[test]
fn test_partial_frame_waits_for_more_bytes() {
    let wire = FrameCodec::encode(&Frame::send("/app/a", Bytes::from_static(b"hello"), None));
    let mut decoder = FrameDecoder::default();

    decoder.push(&wire[..wire.len() - 1]);
    assert_eq!(decoder.next_frame().unwrap(), None);
    assert_eq!(decoder.buffered(), wire.len() - 1);

    decoder.push(&wire[wire.len() - 1..]);
    let frame = decoder.next_frame().unwrap().unwrap();
    assert_eq!(frame.command(), Command::Send);
    assert_eq!(&frame.payload()[..], b"hello");
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_oversized_frame_rejected() {
    let mut decoder = FrameDecoder::new(64);
    decoder.push(b"MESSAGE\ndestination:/t\n\n");
    decoder.push(&[b'x'; 128]);

    assert!(matches!(
        decoder.next_frame(),
        Err(ProtocolError::FrameTooLarge { max: 64 })
    ));
}

#[test]
fn test_connect_headers_not_escaped() {
    let frame = Frame::connect("chat", (10_000, 10_000), Some(("Authorization", "Bearer a:b".into())));
    let wire = FrameCodec::encode(&frame);

    let text = std::str::from_utf8(&wire).unwrap();
    assert!(text.starts_with("CONNECT\n"));
    assert!(text.contains("Authorization:Bearer a:b\n"));
    assert!(text.contains("heart-beat:10000,10000\n"));
}
