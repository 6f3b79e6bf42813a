//! # Frame
//!
//! Decoded WebSocket frames as defined in
//! [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! A [`Frame`] is the unit this crate receives from the frame decoder: one
//! protocol-level message fragment carrying an opcode, the header flags and an
//! optional payload. Frames come in two categories:
//!
//! - **Data frames**: [`OpCode::Text`], [`OpCode::Binary`] and
//!   [`OpCode::Continuation`], which together form (possibly fragmented)
//!   messages.
//! - **Control frames**: [`OpCode::Close`], [`OpCode::Ping`] and
//!   [`OpCode::Pong`], which manage the connection. They must not be
//!   fragmented and their payload is limited to 125 bytes.
//!
//! The decoder hands frames over fully unmasked; the `masked` flag only
//! records whether the wire frame carried a masking key, which is itself a
//! protocol violation for server-to-client traffic (see [`crate::verify`]).
//!
//! ```rust
//! use wsrx::frame::Frame;
//! use wsrx::close::CloseCode;
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let first_fragment = Frame::text("Hel").with_fin(false);
//! let pong = Frame::pong(Some("Ping payload".into()));
//! let close = Frame::close(CloseCode::Normal, "Normal closure");
//! ```

use bytes::Bytes;

use crate::close::CloseCode;

/// WebSocket operation code (OpCode) that determines the semantic meaning and
/// handling of a frame.
///
/// The numeric values are defined in
/// [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8):
/// Continuation = 0x0, Text = 0x1, Binary = 0x2, Close = 0x8, Ping = 0x9,
/// Pong = 0xA.
///
/// The remaining values (0x3-0x7 and 0xB-0xF) are reserved for future
/// protocol extensions. The decoder does not reject them: it preserves the
/// raw value in [`OpCode::Unknown`], and the verifier decides whether such a
/// frame is acceptable (it is only when the connection runs in extended mode).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// A reserved opcode value (0x3-0x7 or 0xB-0xF).
    Unknown(u8),
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame.
    ///
    /// The whole 0x8-0xF opcode range is reserved for control frames, so a
    /// reserved opcode from that range counts as a control frame too.
    /// Control frames have special constraints:
    /// - Cannot be fragmented (the FIN bit must be set)
    /// - Payload must not exceed 125 bytes
    pub fn is_control(&self) -> bool {
        match *self {
            OpCode::Close | OpCode::Ping | OpCode::Pong => true,
            OpCode::Unknown(code) => code >= 0x8,
            _ => false,
        }
    }
}

impl From<u8> for OpCode {
    /// Interprets the low nibble of a frame header byte as an opcode.
    ///
    /// Reserved values are preserved as [`OpCode::Unknown`] rather than
    /// rejected here; whether they are tolerated depends on the connection's
    /// extended mode and is the verifier's call.
    fn from(value: u8) -> Self {
        match value {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Unknown(other),
        }
    }
}

impl From<OpCode> for u8 {
    /// Converts an `OpCode` into its corresponding byte representation.
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Unknown(code) => code,
        }
    }
}

/// A decoded WebSocket frame.
///
/// Immutable once decoded: the reception loop owns a frame for the duration of
/// one iteration and hands it to listeners by reference.
///
/// # Fields
/// - `fin`: final-fragment flag. When `true`, this frame completes a message.
/// - `rsv1`/`rsv2`/`rsv3`: reserved extension bits. Must be zero unless an
///   extension was negotiated (extended mode).
/// - `opcode`: frame type, including reserved values as [`OpCode::Unknown`].
/// - `masked`: whether the wire frame carried a masking key.
/// - `payload`: the (already unmasked) payload. `None` means the frame had no
///   payload at all, which is distinct from an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final fragment in a message.
    pub fin: bool,
    /// First reserved bit (used by extensions, e.g. per-message compression).
    pub rsv1: bool,
    /// Second reserved bit.
    pub rsv2: bool,
    /// Third reserved bit.
    pub rsv3: bool,
    /// The opcode of the frame, defining its type.
    pub opcode: OpCode,
    /// Whether the frame arrived masked.
    pub masked: bool,
    /// The payload of the frame, absent when the frame carried none.
    pub payload: Option<Bytes>,
}

impl Frame {
    /// Creates a new frame with all flags cleared, `fin` set and the given
    /// opcode and payload.
    pub fn new(opcode: OpCode, payload: Option<Bytes>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            masked: false,
            payload,
        }
    }

    /// Creates a final text frame with the given payload.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, Some(payload.into()))
    }

    /// Creates a final binary frame with the given payload.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, Some(payload.into()))
    }

    /// Creates a final continuation frame with the given payload.
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Continuation, Some(payload.into()))
    }

    /// Creates a ping frame. The payload may be absent.
    pub fn ping(payload: Option<Bytes>) -> Self {
        Self::new(OpCode::Ping, payload)
    }

    /// Creates a pong frame. RFC 6455, 5.5.3 requires a pong sent in response
    /// to a ping to carry identical application data, so the payload is taken
    /// as-is, absent stays absent.
    pub fn pong(payload: Option<Bytes>) -> Self {
        Self::new(OpCode::Pong, payload)
    }

    /// Creates a close frame with a close code and reason.
    ///
    /// The payload is built by combining the two-byte code with the reason
    /// bytes, as laid out in RFC 6455, 5.5.1.
    pub fn close(code: CloseCode, reason: impl AsRef<[u8]>) -> Self {
        let code16 = u16::from(code);
        let reason = reason.as_ref();
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code16.to_be_bytes());
        payload.extend_from_slice(reason);

        Self::new(OpCode::Close, Some(payload.into()))
    }

    /// Creates a close frame with a raw payload, without enforcing the
    /// code/reason structure.
    pub fn close_raw(payload: Option<Bytes>) -> Self {
        Self::new(OpCode::Close, payload)
    }

    /// Sets the FIN bit and returns the frame, for building fragments.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Sets the RSV1 bit and returns the frame.
    pub fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.rsv1 = rsv1;
        self
    }

    /// Marks the frame as having arrived masked and returns it.
    pub fn with_masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    /// Returns `true` if any of the reserved bits is set.
    pub fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Returns `true` if this is a control frame (opcode in the 0x8-0xF range).
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// The payload as a byte slice, empty when the payload is absent.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// The payload length in bytes, zero when the payload is absent.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }

    /// Extracts the close code from a close frame's payload.
    ///
    /// # Returns
    /// - `Some(CloseCode)` if the payload starts with a two-byte status code
    /// - `None` if the payload is absent or too short to contain one
    pub fn close_code(&self) -> Option<CloseCode> {
        let payload = self.payload.as_ref()?;
        let code = u16::from_be_bytes(payload.get(0..2)?.try_into().ok()?);
        Some(CloseCode::from(code))
    }

    /// Extracts the close reason from a close frame's payload.
    ///
    /// # Returns
    /// - `Some(&str)` with the UTF-8 reason following the status code
    /// - `None` if there is no reason or it is not valid UTF-8
    pub fn close_reason(&self) -> Option<&str> {
        let payload = self.payload.as_ref()?;
        std::str::from_utf8(payload.get(2..)?).ok()
    }
}
