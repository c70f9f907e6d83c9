//! Framing module - logical frames and the transport frame codecs.
//!
//! A [`Frame`] is the logical unit exchanged with the radio: direction,
//! subsystem, command identifier and raw payload bytes. The [`FrameCodec`]
//! trait converts frames to and from a delimited byte stream; upper layers
//! never know which concrete codec is active.
//!
//! Two codecs are provided:
//! - [`CodecKind::Stuffed`]: delimiter-framed with byte-stuffing and a
//!   16-bit additive checksum.
//! - [`CodecKind::LengthPrefixed`]: start-of-frame byte, length field and a
//!   single XOR checksum byte, no escaping.

mod frame;
mod prefixed;
mod stuffed;

use bytes::BytesMut;
use thiserror::Error;

pub use frame::{Direction, Frame};
pub use prefixed::PrefixedCodec;
pub use stuffed::StuffedCodec;

/// Largest payload the firmware's scratch buffers accept.
pub const MAX_PAYLOAD_SIZE: usize = 250;

/// Decode-level errors. These are surfaced as events and logged; a
/// malformed unit never halts the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("checksum mismatch (expected {expected:#06x}, got {actual:#06x})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("invalid escape sequence {0:#04x}")]
    InvalidEscape(u8),

    #[error("frame unit of {0} byte(s) is shorter than the minimum")]
    TooShort(usize),

    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_SIZE} byte maximum")]
    Oversized(usize),

    #[error("invalid direction bits {0:#04x}")]
    InvalidDirection(u8),

    #[error("unknown subsystem bits {0:#04x}")]
    UnknownSubsystem(u8),
}

/// One outcome of feeding bytes to a decoder: either a verified frame or
/// a recoverable decode error (the stream resynchronizes afterwards).
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    Frame(Frame),
    Error(FrameError),
}

/// A transport frame codec.
///
/// `encode` serializes one frame into `dst`. `push` consumes an arbitrary
/// chunk of received bytes, buffering partial units internally and
/// appending a [`DecodeEvent`] for every complete unit found.
pub trait FrameCodec: Send {
    fn encode(&self, frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError>;
    fn push(&mut self, chunk: &[u8], events: &mut Vec<DecodeEvent>);
}

/// Selects the concrete framing variant for a hardware backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Stuffed,
    LengthPrefixed,
}

impl CodecKind {
    /// Create a fresh codec instance of this kind.
    pub fn codec(self) -> Box<dyn FrameCodec> {
        match self {
            CodecKind::Stuffed => Box::new(StuffedCodec::new()),
            CodecKind::LengthPrefixed => Box::new(PrefixedCodec::new()),
        }
    }
}
