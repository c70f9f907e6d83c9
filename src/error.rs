//! Error types for znp-link.

use std::time::Duration;

use thiserror::Error;

use crate::framing::{Direction, FrameError};
use crate::schema::{ParameterType, Subsystem};
use crate::status::{describe, FailureKind};

/// Main error type for all engine operations.
///
/// Every failure surfaced to a caller is one of these variants; the engine
/// never reports a bare string and never terminates on a failed exchange.
#[derive(Debug, Error)]
pub enum ZnpError {
    /// I/O error on the underlying byte link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or checksum-failing frame.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Subsystem bits not present in the catalog.
    #[error("unknown subsystem {0}")]
    UnknownSubsystem(u8),

    /// Command name or identifier not present in the catalog.
    #[error("command '{command}' does not exist in subsystem {subsystem:?}")]
    UnknownCommand {
        subsystem: Subsystem,
        command: String,
    },

    /// The catalog declares no parameter list for this wire direction.
    #[error("command {id:#04x} in subsystem {subsystem:?} cannot be a {direction}")]
    CannotBeDecoded {
        subsystem: Subsystem,
        id: u8,
        direction: Direction,
    },

    /// Parameter type only ever appears in replies and indications.
    #[error("parameter type {0:?} cannot appear in a request")]
    UnwritableType(ParameterType),

    /// Caller-supplied payload is missing a declared parameter.
    #[error("request payload is missing parameter '{parameter}'")]
    MissingParameter { parameter: String },

    /// Supplied value does not carry the declared parameter type.
    #[error("value for parameter '{parameter}' does not match declared type {expected:?}")]
    WrongValueType {
        parameter: String,
        expected: ParameterType,
    },

    /// Fixed-size buffer written with the wrong number of bytes.
    #[error("parameter '{parameter}' requires exactly {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        parameter: String,
        expected: usize,
        actual: usize,
    },

    /// Reply payload ended before all declared parameters were read.
    #[error("payload truncated: needed {needed} more byte(s), {remaining} remaining")]
    PayloadTruncated { needed: usize, remaining: usize },

    /// Variable-length parameter without a usable preceding count field.
    #[error("parameter '{parameter}' has no preceding length field")]
    MissingLengthField { parameter: String },

    /// Synchronous command completed without producing a reply object.
    #[error("command '{command}' has no reply")]
    NoReply { command: String },

    /// Fire-and-forget submission of a command that expects a reply.
    #[error("command '{command}' expects a synchronous reply")]
    ExpectsReply { command: String },

    /// No matching inbound object arrived within the deadline.
    #[error("no match for '{matcher}' within {after:?}")]
    Timeout { matcher: String, after: Duration },

    /// The radio acknowledged the request but rejected the operation.
    #[error("request rejected with status {code:#04x} ({})", describe(*code))]
    StatusRejected { code: u8 },

    /// Data delivery gave up after exhausting the recovery ladder.
    #[error("delivery failed after {attempts} attempt(s): {kind} (status {code:#04x})")]
    DeliveryFailed {
        kind: FailureKind,
        code: u8,
        attempts: u8,
    },

    /// Waiter or queued request was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The link was closed; no further requests are accepted.
    #[error("link closed")]
    LinkClosed,
}

/// Result type alias using [`ZnpError`].
pub type Result<T> = std::result::Result<T, ZnpError>;
