//! Close codes for the WebSocket closing handshake, as defined in
//! [RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4).
//!
//! When the reception engine detects a fault it synthesizes a close frame
//! whose status code reflects the fault category: protocol violations map to
//! [`CloseCode::Protocol`], oversize conditions to [`CloseCode::Size`] and
//! transport faults to [`CloseCode::Policy`]. The mapping itself lives in
//! [`crate::recv::close_code_for`].

/// Status code sent in a close frame, indicating the reason for closure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: normal closure, the purpose for which the connection was
    /// established has been fulfilled.
    Normal,
    /// 1001: the endpoint is going away (server shutdown, browser navigation).
    Away,
    /// 1002: the endpoint terminated the connection due to a protocol error.
    Protocol,
    /// 1003: the endpoint received data of a type it cannot accept.
    Unsupported,
    /// 1005: reserved; no status code was present in the close frame.
    Status,
    /// 1006: reserved; the connection closed abnormally without a close frame.
    Abnormal,
    /// 1007: a message contained data inconsistent with its type (e.g. a text
    /// message with non-UTF-8 payload).
    Invalid,
    /// 1008: the endpoint received a message that violates its policy.
    Policy,
    /// 1009: the endpoint received a message too big to process.
    Size,
    /// 1010: the client expected an extension the server did not negotiate.
    Extension,
    /// 1011: the server encountered an unexpected condition.
    Error,
    /// 1015: reserved; the TLS handshake failed.
    Tls,
    /// Any other status code, preserved verbatim.
    Other(u16),
}

impl CloseCode {
    /// Returns `true` for codes an endpoint may actually put on the wire.
    ///
    /// The reserved codes (1004, 1005, 1006, 1015) and everything below 1000
    /// must never be sent in a close frame.
    pub fn is_allowed(&self) -> bool {
        !matches!(
            *self,
            Self::Status | Self::Abnormal | Self::Tls | Self::Other(0..=999) | Self::Other(1004)
        )
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::Status,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1015 => Self::Tls,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Tls => 1015,
            CloseCode::Other(other) => other,
        }
    }
}
