//! # wsrx
//! Frame-reception engine for a client-side WebSocket implementation (RFC 6455).
//!
//! This crate owns the receiving half of an established connection: it pulls
//! decoded frames off the wire, enforces the protocol-conformance rules from
//! [RFC 6455 Section 5](https://datatracker.ietf.org/doc/html/rfc6455#section-5),
//! reassembles fragmented messages, answers ping frames, and drives the closing
//! handshake, all while an application writer path runs concurrently.
//!
//! The engine deliberately does **not** own the HTTP upgrade handshake, the
//! TLS/socket setup, the byte-level frame codec, or the outbound send path.
//! Those are collaborators:
//!
//! - frames arrive through any [`futures::Stream`] of decoded [`frame::Frame`]s
//!   (a `tokio_util::codec::Framed` decoder in practice);
//! - outbound frames (pong replies, close echoes, synthesized close frames)
//!   are queued best-effort on a [`tokio::sync::mpsc::UnboundedSender`];
//! - application callbacks go through the [`events::EventSink`] trait.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use wsrx::{EventSink, Options, Receiver, StateManager};
//!
//! struct Quiet;
//! impl EventSink for Quiet {}
//!
//! # async fn run(frames: futures::stream::Empty<wsrx::Result<wsrx::frame::Frame>>) {
//! let (out_tx, _out_rx) = tokio::sync::mpsc::unbounded_channel();
//! let state = StateManager::shared();
//! let token = CancellationToken::new();
//!
//! let receiver = Receiver::new(
//!     frames,
//!     out_tx,
//!     Arc::new(Quiet),
//!     state,
//!     token.clone(),
//!     Options::default(),
//! );
//!
//! let handle = receiver.spawn();
//! // ... later, from anywhere:
//! token.cancel();
//! let close_frame = handle.await.unwrap();
//! # }
//! ```
//!
//! # Feature flags
//! - `logging`: debug logging of frame verification and loop transitions using
//!   the `log` crate.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod close;
pub mod events;
pub mod frame;
pub mod recv;
pub mod state;
pub mod verify;

use thiserror::Error;

pub use close::CloseCode;
pub use events::EventSink;
pub use frame::{Frame, OpCode};
pub use recv::{Options, Receiver};
pub use state::{CloseInitiator, ConnectionState, SharedStateManager, StateManager};

/// A result type for WebSocket reception, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Errors raised while receiving and interpreting WebSocket frames.
///
/// The variants fall into four groups:
///
/// - Protocol violations detected by frame verification (reserved bits,
///   unknown opcodes, masking, fragmentation, control payload size)
/// - Decode faults reported by the frame codec (truncated input, bad lengths)
/// - Transport faults (I/O errors and genuine read interruptions)
/// - Application-data faults (message reassembly and UTF-8 decoding)
///
/// Each variant maps to a specific close code when the engine synthesizes a
/// close frame; see [`recv::close_code_for`] for the mapping.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// At least one of RSV1/RSV2/RSV3 is set on a frame while no extension
    /// has been negotiated. RFC 6455 requires these bits to be 0 unless an
    /// extension defines meanings for non-zero values.
    #[error("at least one of the reserved bits of a frame is set: RSV1={0},RSV2={1},RSV3={2}")]
    NonZeroReservedBits(bool, bool, bool),

    /// A frame carries an opcode outside the six defined values.
    /// RFC 6455, 5.2: "If an unknown opcode is received, the receiving
    /// endpoint MUST Fail the WebSocket Connection."
    #[error("a frame has an unknown opcode: {0:#x}")]
    UnknownOpcode(u8),

    /// A frame arriving from the server is masked. RFC 6455, 5.1: a server
    /// must not mask any frames it sends to the client.
    #[error("a frame from the server is masked")]
    FrameMasked,

    /// A control frame arrived with the FIN bit cleared. RFC 6455, 5.5:
    /// control frames must not be fragmented.
    #[error("a control frame is fragmented")]
    FragmentedControlFrame,

    /// A continuation frame arrived although no fragmented message is open.
    #[error("a continuation frame was detected although a continuation had not started")]
    UnexpectedContinuationFrame,

    /// A new data frame arrived while a fragmented message is still open.
    #[error(
        "a non-control frame was detected although the existing continuation had not been closed"
    )]
    ContinuationNotClosed,

    /// A control frame payload exceeds the 125-byte limit from RFC 6455, 5.5.
    #[error("the payload size of a control frame exceeds the maximum size (125 bytes): {0}")]
    TooLongControlFramePayload(usize),

    /// The connection ended before a complete frame could be decoded.
    #[error("the end of the stream was reached before a frame was fully read")]
    InsufficientData,

    /// The payload length field of a frame could not be interpreted.
    #[error("a frame carries an invalid payload length")]
    InvalidPayloadLength,

    /// A frame payload exceeds the maximum the decoder is willing to read.
    #[error("a frame payload is too long")]
    TooLongPayload,

    /// The decoder could not allocate space for a frame payload.
    #[error("failed to allocate memory for a frame payload")]
    InsufficientMemoryForPayload,

    /// The read was interrupted while a frame was being read, and the
    /// interruption was not caused by a stop request.
    #[error("interruption occurred while a frame was being read from the web socket")]
    InterruptedInReading(#[source] std::io::Error),

    /// An I/O error occurred while a frame was being read.
    #[error("an I/O error occurred while a frame was being read from the web socket")]
    IoErrorInReading(#[source] std::io::Error),

    /// Concatenating the payloads of a fragmented message failed, either
    /// because the combined size exceeds the configured limit or because the
    /// buffer could not be grown.
    #[error("failed to concatenate payloads of multiple frames to construct a message")]
    MessageConstruction,

    /// The payload of a completed text message is not valid UTF-8.
    #[error("failed to convert payload data into a string")]
    TextMessageConstruction(#[source] std::str::Utf8Error),

    /// An I/O error surfaced by the underlying frame stream outside the
    /// read-classification path.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
