//! Command schema registry.
//!
//! A static table mapping `(subsystem, command name)` and `(subsystem,
//! command identifier)` to ordered, typed parameter lists. The table is
//! process-lifetime `&'static` data, read-only after compilation, so it is
//! shared across tasks without locking.
//!
//! Lookups fail loudly: an inbound frame whose identifier is not in the
//! catalog is a decode failure, never silently coerced.

mod catalog;

use crate::error::{Result, ZnpError};

/// Radio firmware subsystems, numbered as carried in the low five bits of
/// the first command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subsystem {
    Sys = 1,
    Mac = 2,
    Nwk = 3,
    Af = 4,
    Zdo = 5,
    Sapi = 6,
    Util = 7,
    Debug = 8,
    App = 9,
    AppCnf = 15,
    GreenPower = 21,
}

impl Subsystem {
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            1 => Self::Sys,
            2 => Self::Mac,
            3 => Self::Nwk,
            4 => Self::Af,
            5 => Self::Zdo,
            6 => Self::Sapi,
            7 => Self::Util,
            8 => Self::Debug,
            9 => Self::App,
            15 => Self::AppCnf,
            21 => Self::GreenPower,
            _ => return None,
        })
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The closed set of parameter encodings.
///
/// Fixed-size buffers of different lengths are distinct tags: the wire
/// format carries no length for them, so the tag is the only source of
/// truth and a mismatched write must fail rather than truncate or pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Uint8,
    Int8,
    Uint16,
    Uint32,
    /// 64-bit extended address, encoded as 8 raw bytes in wire order.
    IeeeAddr,
    /// Variable-length buffer; byte count comes from a sibling field.
    Buffer,
    Buffer8,
    Buffer16,
    Buffer18,
    Buffer32,
    Buffer42,
    Buffer100,
    ListU8,
    ListU16,
    /// Network descriptors (fixed element layout, runtime count).
    ListNetwork,
    /// Routing table entries (fixed element layout, runtime count).
    ListRouting,
    /// Associated-device short addresses; needs both a count and a start
    /// index resolved from earlier sibling fields.
    ListAssocDev,
}

impl ParameterType {
    /// Types whose byte length is only known from a sibling count field.
    pub fn is_variable_length(self) -> bool {
        matches!(
            self,
            Self::Buffer
                | Self::ListU8
                | Self::ListU16
                | Self::ListNetwork
                | Self::ListRouting
                | Self::ListAssocDev
        )
    }

    /// Declared byte length of a fixed-size buffer tag.
    pub fn fixed_buffer_len(self) -> Option<usize> {
        Some(match self {
            Self::Buffer8 => 8,
            Self::Buffer16 => 16,
            Self::Buffer18 => 18,
            Self::Buffer32 => 32,
            Self::Buffer42 => 42,
            Self::Buffer100 => 100,
            _ => return None,
        })
    }
}

/// One named, typed command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub ty: ParameterType,
}

/// Whether a command is a synchronous exchange or fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Synchronous request answered by a synchronous reply.
    Sreq,
    /// Asynchronous request or indication; no reply on the wire.
    Areq,
}

/// Schema entry for one command.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub id: u8,
    pub kind: CommandKind,
    /// Parameters in request (and indication) direction, in wire order.
    pub request: &'static [Parameter],
    /// Parameters of the synchronous reply, when the command has one.
    pub response: Option<&'static [Parameter]>,
    /// Per-command reply deadline override in milliseconds; commissioning
    /// commands legitimately take tens of seconds.
    pub timeout_ms: Option<u64>,
}

/// Look up a command by its caller-facing name.
pub fn command_by_name(subsystem: Subsystem, name: &str) -> Result<&'static CommandDescriptor> {
    catalog::commands(subsystem)
        .iter()
        .find(|command| command.name == name)
        .ok_or_else(|| ZnpError::UnknownCommand {
            subsystem,
            command: name.to_owned(),
        })
}

/// Look up a command by its wire identifier.
pub fn command_by_id(subsystem: Subsystem, id: u8) -> Result<&'static CommandDescriptor> {
    catalog::commands(subsystem)
        .iter()
        .find(|command| command.id == id)
        .ok_or(ZnpError::UnknownCommand {
            subsystem,
            command: format!("{id:#04x}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let command = command_by_name(Subsystem::Sys, "osalNvRead").unwrap();
        assert_eq!(command.id, 8);
        assert_eq!(command.kind, CommandKind::Sreq);
        assert_eq!(command.request.len(), 2);
        assert_eq!(command.response.unwrap().len(), 3);
    }

    #[test]
    fn test_lookup_by_id() {
        let command = command_by_id(Subsystem::Af, 128).unwrap();
        assert_eq!(command.name, "dataConfirm");
        assert_eq!(command.kind, CommandKind::Areq);
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(matches!(
            command_by_name(Subsystem::Sys, "noSuchCommand"),
            Err(ZnpError::UnknownCommand { .. })
        ));
        assert!(matches!(
            command_by_id(Subsystem::Sys, 0xfe),
            Err(ZnpError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_names_and_ids_unique_within_subsystem() {
        for subsystem in [
            Subsystem::Sys,
            Subsystem::Util,
            Subsystem::Zdo,
            Subsystem::Af,
            Subsystem::AppCnf,
        ] {
            let commands = catalog::commands(subsystem);
            for (index, command) in commands.iter().enumerate() {
                for other in &commands[index + 1..] {
                    assert_ne!(command.name, other.name, "duplicate name in {subsystem:?}");
                    assert_ne!(command.id, other.id, "duplicate id in {subsystem:?}");
                }
            }
        }
    }

    #[test]
    fn test_subsystem_bits_roundtrip() {
        for bits in [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 15, 21] {
            let subsystem = Subsystem::from_bits(bits).unwrap();
            assert_eq!(subsystem.bits(), bits);
        }
        assert_eq!(Subsystem::from_bits(0), None);
        assert_eq!(Subsystem::from_bits(31), None);
    }
}
