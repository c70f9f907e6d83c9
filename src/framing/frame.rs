//! The logical frame exchanged with the radio.

use bytes::Bytes;

use crate::schema::Subsystem;

/// Wire direction of a frame.
///
/// The numeric values are the direction bits carried in the high three
/// bits of the first command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Synchronous request from host to radio.
    Sreq = 1,
    /// Unsolicited notification, or a fire-and-forget request.
    Areq = 2,
    /// Synchronous reply to an [`Direction::Sreq`].
    Srsp = 3,
}

impl Direction {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Sreq),
            2 => Some(Self::Areq),
            3 => Some(Self::Srsp),
            _ => None,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sreq => "SREQ",
            Self::Areq => "AREQ",
            Self::Srsp => "SRSP",
        })
    }
}

/// A complete logical frame. Immutable once constructed; lives for one
/// transport exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub direction: Direction,
    pub subsystem: Subsystem,
    pub command_id: u8,
    /// Raw payload bytes (cheaply cloneable via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    pub fn new(
        direction: Direction,
        subsystem: Subsystem,
        command_id: u8,
        payload: Bytes,
    ) -> Self {
        Self {
            direction,
            subsystem,
            command_id,
            payload,
        }
    }

    /// First command byte: direction in the high three bits, subsystem in
    /// the low five.
    #[inline]
    pub fn cmd0(&self) -> u8 {
        ((self.direction.bits() << 5) & 0xe0) | (self.subsystem.bits() & 0x1f)
    }

    /// Split a command byte back into direction and subsystem.
    pub fn split_cmd0(cmd0: u8) -> (u8, u8) {
        ((cmd0 & 0xe0) >> 5, cmd0 & 0x1f)
    }
}
