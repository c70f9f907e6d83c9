//! Firmware status codes and delivery failure kinds.

/// Status codes reported by the radio firmware in reply `status` fields
/// and in data-delivery confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZnpStatus {
    Success = 0x00,
    Failure = 0x01,
    InvalidParameter = 0x02,
    BufferFull = 0x11,
    MacNoResources = 0x1a,
    NwkNoRoute = 0xcd,
    MacChannelAccessFailure = 0xe1,
    MacNoAck = 0xe9,
    MacTransactionExpired = 0xf0,
}

impl ZnpStatus {
    /// Numeric wire value.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Success,
            0x01 => Self::Failure,
            0x02 => Self::InvalidParameter,
            0x11 => Self::BufferFull,
            0x1a => Self::MacNoResources,
            0xcd => Self::NwkNoRoute,
            0xe1 => Self::MacChannelAccessFailure,
            0xe9 => Self::MacNoAck,
            0xf0 => Self::MacTransactionExpired,
            _ => return None,
        })
    }
}

/// Human-readable description of a status code, for error messages.
pub fn describe(code: u8) -> &'static str {
    match ZnpStatus::from_code(code) {
        Some(ZnpStatus::Success) => "success",
        Some(ZnpStatus::Failure) => "failure",
        Some(ZnpStatus::InvalidParameter) => "invalid parameter",
        Some(ZnpStatus::BufferFull) => "buffer full",
        Some(ZnpStatus::MacNoResources) => "MAC no resources",
        Some(ZnpStatus::NwkNoRoute) => "no network route",
        Some(ZnpStatus::MacChannelAccessFailure) => "MAC channel access failure",
        Some(ZnpStatus::MacNoAck) => "MAC no acknowledgement",
        Some(ZnpStatus::MacTransactionExpired) => "MAC transaction expired",
        None => "unknown status",
    }
}

/// The kind of data-delivery failure reported by the firmware.
///
/// Drives the recovery ladder in [`crate::delivery`]: recoverable kinds are
/// retried with escalating recovery actions, everything else fails the
/// delivery call immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ChannelAccess,
    BufferFull,
    NoResources,
    NoRoute,
    NoAck,
    TransactionExpired,
    /// The delivery confirmation never arrived at all.
    ConfirmTimeout,
    /// Any status code outside the recoverable set.
    Other,
}

impl FailureKind {
    pub fn from_status(code: u8) -> Self {
        match ZnpStatus::from_code(code) {
            Some(ZnpStatus::MacChannelAccessFailure) => Self::ChannelAccess,
            Some(ZnpStatus::BufferFull) => Self::BufferFull,
            Some(ZnpStatus::MacNoResources) => Self::NoResources,
            Some(ZnpStatus::NwkNoRoute) => Self::NoRoute,
            Some(ZnpStatus::MacNoAck) => Self::NoAck,
            Some(ZnpStatus::MacTransactionExpired) => Self::TransactionExpired,
            _ => Self::Other,
        }
    }

    /// Whether the recovery ladder may retry after this kind of failure.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::ConfirmTimeout | Self::Other)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ChannelAccess => "channel access failure",
            Self::BufferFull => "buffer full",
            Self::NoResources => "no resources",
            Self::NoRoute => "no route",
            Self::NoAck => "no acknowledgement",
            Self::TransactionExpired => "transaction expired",
            Self::ConfirmTimeout => "confirmation timeout",
            Self::Other => "unrecoverable status",
        })
    }
}
