//! Delimiter-framed codec with byte-stuffing and additive checksum.
//!
//! Each frame is bracketed by the reserved delimiter octet. The content
//! between delimiters is `cmd0, cmd1, payload..` followed by a 16-bit
//! additive checksum computed as `(!sum + 1) mod 65536` over the unescaped
//! content, appended little-endian. Any occurrence of the delimiter or the
//! escape octet inside the content (checksum included) is escaped before
//! transmission.
//!
//! The decoder buffers until a closing delimiter arrives, unescapes,
//! verifies the checksum and only then produces a frame. A failed unit is
//! reported as an error event and the stream continues at the next
//! delimiter.

use bytes::{BufMut, Bytes, BytesMut};

use crate::schema::Subsystem;

use super::{DecodeEvent, Direction, Frame, FrameCodec, FrameError, MAX_PAYLOAD_SIZE};

const END: u8 = 0xc0;
const ESC: u8 = 0xdb;
const ESC_END: u8 = 0xdc;
const ESC_ESC: u8 = 0xdd;

/// cmd0 + cmd1 + two checksum bytes.
const MIN_UNIT_LENGTH: usize = 4;

fn checksum(content: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for byte in content {
        sum = sum.wrapping_add(u16::from(*byte));
    }
    (!sum).wrapping_add(1)
}

fn put_escaped(dst: &mut BytesMut, byte: u8) {
    match byte {
        END => {
            dst.put_u8(ESC);
            dst.put_u8(ESC_END);
        }
        ESC => {
            dst.put_u8(ESC);
            dst.put_u8(ESC_ESC);
        }
        other => dst.put_u8(other),
    }
}

/// Streaming codec for the delimiter-framed transport variant.
pub struct StuffedCodec {
    /// Unescaped content of the unit currently being received.
    unit: Vec<u8>,
    /// An escape octet was seen and the next byte completes it.
    escaping: bool,
    /// Set after a malformed escape; swallow bytes until the next delimiter.
    discarding: bool,
}

impl StuffedCodec {
    pub fn new() -> Self {
        Self {
            unit: Vec::new(),
            escaping: false,
            discarding: false,
        }
    }

    fn finish_unit(&mut self, events: &mut Vec<DecodeEvent>) {
        let unit = std::mem::take(&mut self.unit);

        if unit.len() < MIN_UNIT_LENGTH {
            events.push(DecodeEvent::Error(FrameError::TooShort(unit.len())));
            return;
        }

        let (content, fcs) = unit.split_at(unit.len() - 2);
        let expected = checksum(content);
        let actual = u16::from_le_bytes([fcs[0], fcs[1]]);

        if actual != expected {
            events.push(DecodeEvent::Error(FrameError::ChecksumMismatch {
                expected,
                actual,
            }));
            return;
        }

        if content.len() - 2 > MAX_PAYLOAD_SIZE {
            events.push(DecodeEvent::Error(FrameError::Oversized(content.len() - 2)));
            return;
        }

        let (direction_bits, subsystem_bits) = Frame::split_cmd0(content[0]);
        let Some(direction) = Direction::from_bits(direction_bits) else {
            events.push(DecodeEvent::Error(FrameError::InvalidDirection(direction_bits)));
            return;
        };
        let Some(subsystem) = Subsystem::from_bits(subsystem_bits) else {
            events.push(DecodeEvent::Error(FrameError::UnknownSubsystem(subsystem_bits)));
            return;
        };

        events.push(DecodeEvent::Frame(Frame::new(
            direction,
            subsystem,
            content[1],
            Bytes::copy_from_slice(&content[2..]),
        )));
    }
}

impl Default for StuffedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for StuffedCodec {
    fn encode(&self, frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::Oversized(frame.payload.len()));
        }

        let mut content = Vec::with_capacity(frame.payload.len() + 2);
        content.push(frame.cmd0());
        content.push(frame.command_id);
        content.extend_from_slice(&frame.payload);
        let fcs = checksum(&content);

        dst.reserve(content.len() * 2 + 6);
        dst.put_u8(END);
        for byte in content {
            put_escaped(dst, byte);
        }
        for byte in fcs.to_le_bytes() {
            put_escaped(dst, byte);
        }
        dst.put_u8(END);
        Ok(())
    }

    fn push(&mut self, chunk: &[u8], events: &mut Vec<DecodeEvent>) {
        for &byte in chunk {
            if byte == END {
                // Also terminates a discard run; back-to-back delimiters
                // (idle line noise) produce no unit at all.
                let discarded = std::mem::take(&mut self.discarding);
                self.escaping = false;
                if !discarded && !self.unit.is_empty() {
                    self.finish_unit(events);
                }
                self.unit.clear();
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.escaping {
                self.escaping = false;
                match byte {
                    ESC_END => self.unit.push(END),
                    ESC_ESC => self.unit.push(ESC),
                    other => {
                        events.push(DecodeEvent::Error(FrameError::InvalidEscape(other)));
                        self.discarding = true;
                        self.unit.clear();
                    }
                }
                continue;
            }

            if byte == ESC {
                self.escaping = true;
            } else {
                self.unit.push(byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut StuffedCodec, bytes: &[u8]) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        codec.push(bytes, &mut events);
        events
    }

    #[test]
    fn test_checksum_formula() {
        // sum of [0x21, 0x01] is 0x22; (!0x0022 + 1) & 0xffff == 0xffde
        assert_eq!(checksum(&[0x21, 0x01]), 0xffde);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_encode_known_bytes() {
        let frame = Frame::new(Direction::Sreq, Subsystem::Sys, 0x01, Bytes::new());
        let codec = StuffedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();
        assert_eq!(&dst[..], &[END, 0x21, 0x01, 0xde, 0xff, END]);
    }

    #[test]
    fn test_roundtrip() {
        let frame = Frame::new(
            Direction::Srsp,
            Subsystem::Util,
            0x4a,
            Bytes::from_static(&[0x00, 0x12, 0x34]),
        );
        let mut codec = StuffedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();

        let events = decode_all(&mut codec, &dst);
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_roundtrip_with_reserved_octets_in_payload() {
        let frame = Frame::new(
            Direction::Areq,
            Subsystem::Af,
            0x81,
            Bytes::from_static(&[END, ESC, 0x00, END]),
        );
        let mut codec = StuffedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();

        // Delimiters only at the outer edges.
        assert_eq!(dst[0], END);
        assert_eq!(dst[dst.len() - 1], END);
        assert!(!dst[1..dst.len() - 1].contains(&END));

        let events = decode_all(&mut codec, &dst);
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_incremental_decode() {
        let frame = Frame::new(
            Direction::Sreq,
            Subsystem::Zdo,
            0x45,
            Bytes::from_static(&[0x34, 0x12, 0x00, 0x1e]),
        );
        let mut codec = StuffedCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&frame, &mut dst).unwrap();

        let mut events = Vec::new();
        for byte in dst.iter() {
            codec.push(std::slice::from_ref(byte), &mut events);
        }
        assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    #[test]
    fn test_corrupted_byte_rejects_frame_but_not_stream() {
        let first = Frame::new(Direction::Srsp, Subsystem::Sys, 0x01, Bytes::from_static(&[0x79]));
        let second = Frame::new(Direction::Areq, Subsystem::Sys, 0x80, Bytes::from_static(&[0x00]));

        let codec_for_encode = StuffedCodec::new();
        let mut bytes = BytesMut::new();
        codec_for_encode.encode(&first, &mut bytes).unwrap();
        codec_for_encode.encode(&second, &mut bytes).unwrap();

        // Corrupt the payload byte of the first frame.
        let mut bytes = bytes.to_vec();
        bytes[2] ^= 0xff;

        let mut codec = StuffedCodec::new();
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
    fn test_bad_escape_discards_until_next_delimiter() {
        let good = Frame::new(Direction::Srsp, Subsystem::Sys, 0x02, Bytes::new());
        let codec_for_encode = StuffedCodec::new();
        let mut tail = BytesMut::new();
        codec_for_encode.encode(&good, &mut tail).unwrap();

        let mut bytes = vec![END, 0x21, ESC, 0x55, 0x99, 0x88];
        bytes.extend_from_slice(&tail);

        let mut codec = StuffedCodec::new();
        let mut events = Vec::new();
        codec.push(&bytes, &mut events);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], DecodeEvent::Error(FrameError::InvalidEscape(0x55)));
        assert_eq!(events[1], DecodeEvent::Frame(good));
    }

    #[test]
    fn test_empty_units_between_delimiters_are_ignored() {
        let mut codec = StuffedCodec::new();
        let mut events = Vec::new();
        codec.push(&[END, END, END], &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let frame = Frame::new(
            Direction::Sreq,
            Subsystem::Af,
            0x01,
            Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE + 1]),
        );
        let codec = StuffedCodec::new();
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(&frame, &mut dst),
            Err(FrameError::Oversized(_))
        ));
    }
}
