//! Length-prefixed codec without delimiter escaping.
//!
//! Wire layout: start-of-frame octet, one-byte payload length, cmd0
//! (direction and subsystem), cmd1 (command identifier), payload, then a
//! single XOR checksum byte covering everything after the start octet.
//!
//! The decoder scans for the start octet to resynchronize after garbage
//! (bootloader chatter is common on these links) and consumes a full
//! presumed unit on checksum failure so one corrupt frame never poisons
//! the frames behind it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::schema::Subsystem;

use super::{DecodeEvent, Direction, Frame, FrameCodec, FrameError, MAX_PAYLOAD_SIZE};

const SOF: u8 = 0xfe;

/// SOF + length + cmd0 + cmd1 + checksum.
const MIN_FRAME_LENGTH: usize = 5;

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Streaming codec for the length-prefixed transport variant.
pub struct PrefixedCodec {
    buffer: BytesMut,
}

impl PrefixedCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }
}

impl Default for PrefixedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for PrefixedCodec {
    fn encode(&self, frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::Oversized(frame.payload.len()));
        }

        dst.reserve(frame.payload.len() + MIN_FRAME_LENGTH);
        let start = dst.len();
        dst.put_u8(SOF);
        dst.put_u8(frame.payload.len() as u8);
        dst.put_u8(frame.cmd0());
        dst.put_u8(frame.command_id);
        dst.put_slice(&frame.payload);
        let fcs = xor_checksum(&dst[start + 1..]);
        dst.put_u8(fcs);
        Ok(())
    }

    fn push(&mut self, chunk: &[u8], events: &mut Vec<DecodeEvent>) {
        self.buffer.extend_from_slice(chunk);

        loop {
            // Resynchronize: drop noise until a start octet.
            if let Some(start) = self.buffer.iter().position(|&b| b == SOF) {
                self.buffer.advance(start);
            } else {
                self.buffer.clear();
                return;
            }

            if self.buffer.len() < MIN_FRAME_LENGTH {
                return;
            }

            let data_length = usize::from(self.buffer[1]);
            if data_length > MAX_PAYLOAD_SIZE {
                events.push(DecodeEvent::Error(FrameError::Oversized(data_length)));
                self.buffer.advance(1);
                continue;
            }

            let frame_length = MIN_FRAME_LENGTH + data_length;
            if self.buffer.len() < frame_length {
                return;
            }

            let unit = self.buffer.split_to(frame_length);
            let fcs_position = frame_length - 1;
            let expected = xor_checksum(&unit[1..fcs_position]);
            let actual = unit[fcs_position];
            if actual != expected {
                events.push(DecodeEvent::Error(FrameError::ChecksumMismatch {
                    expected: u16::from(expected),
                    actual: u16::from(actual),
                }));
                continue;
            }

            let (direction_bits, subsystem_bits) = Frame::split_cmd0(unit[2]);
            let Some(direction) = Direction::from_bits(direction_bits) else {
                events.push(DecodeEvent::Error(FrameError::InvalidDirection(direction_bits)));
                continue;
            };
            let Some(subsystem) = Subsystem::from_bits(subsystem_bits) else {
                events.push(DecodeEvent::Error(FrameError::UnknownSubsystem(subsystem_bits)));
                continue;
            };

            events.push(DecodeEvent::Frame(Frame::new(
                direction,
                subsystem,
                unit[3],
                Bytes::copy_from_slice(&unit[4..fcs_position]),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_bytes() {
        // SREQ SYS ping with empty payload.
        let frame = Frame::new(Direction::Sreq, Subsystem::Sys, 0x01, Bytes::new());
        let codec = PrefixedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();
        assert_eq!(&dst[..], &[0xfe, 0x00, 0x21, 0x01, 0x20]);
    }

    #[test]
    fn test_roundtrip() {
        let frame = Frame::new(
            Direction::Srsp,
            Subsystem::Sys,
            0x08,
            Bytes::from_static(&[0x00, 0x02, 0x01, 0x02]),
        );
        let mut codec = PrefixedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();

        let mut events = Vec::new();
        codec.push(&dst, &mut events);
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_incremental_decode_across_chunks() {
        let frame = Frame::new(
            Direction::Areq,
            Subsystem::Af,
            0x80,
            Bytes::from_static(&[0x00, 0x01, 0x02]),
        );
        let mut codec = PrefixedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();

        let mut events = Vec::new();
        let (head, tail) = dst.split_at(3);
        codec.push(head, &mut events);
        assert!(events.is_empty());
        codec.push(tail, &mut events);
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_garbage_before_start_of_frame_is_skipped() {
        let frame = Frame::new(Direction::Sreq, Subsystem::Sys, 0x02, Bytes::new());
        let mut codec = PrefixedCodec::new();
        let mut dst = BytesMut::new();
        dst.put_slice(&[0x00, 0x55, 0xaa]);
        codec.encode(&frame, &mut dst).unwrap();

        let mut events = Vec::new();
        codec.push(&dst, &mut events);
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_corrupted_byte_rejects_only_that_frame() {
        let first = Frame::new(Direction::Srsp, Subsystem::Sys, 0x01, Bytes::from_static(&[0x79, 0x01]));
        let second = Frame::new(Direction::Areq, Subsystem::Sys, 0x80, Bytes::from_static(&[0x02]));

        let codec_for_encode = PrefixedCodec::new();
        let mut bytes = BytesMut::new();
        codec_for_encode.encode(&first, &mut bytes).unwrap();
        codec_for_encode.encode(&second, &mut bytes).unwrap();

        let mut bytes = bytes.to_vec();
        bytes[4] ^= 0x10; // payload byte of the first frame

        let mut codec = PrefixedCodec::new();
        let mut events = Vec::new();
        codec.push(&bytes, &mut events);

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            DecodeEvent::Error(FrameError::ChecksumMismatch { .. })
        ));
        assert_eq!(events[1], DecodeEvent::Frame(second));
    }

    #[test]
    fn test_unknown_subsystem_is_reported() {
        // cmd0 with subsystem bits 0x1f, which no backend defines.
        let raw = [SOF, 0x00, 0x3f, 0x01];
        let fcs = xor_checksum(&raw[1..]);
        let mut bytes = raw.to_vec();
        bytes.push(fcs);

        let mut codec = PrefixedCodec::new();
        let mut events = Vec::new();
        codec.push(&bytes, &mut events);
        assert_eq!(
            events,
            vec![DecodeEvent::Error(FrameError::UnknownSubsystem(0x1f))]
        );
    }
}
