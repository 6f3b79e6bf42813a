//! Listener notification capability.
//!
//! The reception engine never talks to listeners directly; it is handed an
//! [`EventSink`] and calls a small fixed set of notification methods on it.
//! How many listeners exist behind the sink, and how failures inside them are
//! handled, is entirely the implementor's business: callbacks are
//! fire-and-forget and must not panic back into the engine.

use crate::{frame::Frame, WebSocketError};

/// Fire-and-forget notifications emitted by the reception loop.
///
/// Every method has a no-op default so implementations only override what
/// they care about:
///
/// ```rust
/// use wsrx::events::EventSink;
///
/// struct Printer;
///
/// impl EventSink for Printer {
///     fn on_text_message(&self, message: &str) {
///         println!("got: {message}");
///     }
/// }
/// ```
pub trait EventSink: Send + Sync {
    /// The connection is established and the reception loop has started.
    /// Fired exactly once, before the first read.
    fn on_connected(&self) {}

    /// A frame passed verification, regardless of its opcode. Fired before
    /// the opcode-specific notification.
    fn on_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A continuation frame was received.
    fn on_continuation_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A text frame was received. For fragmented messages this fires per
    /// frame; the assembled message arrives via [`EventSink::on_text_message`].
    fn on_text_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A binary frame was received.
    fn on_binary_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A close frame was received from the peer.
    fn on_close_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A ping frame was received. The engine answers it with a pong on its
    /// own; this is informational.
    fn on_ping_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A pong frame was received.
    fn on_pong_frame(&self, frame: &Frame) {
        let _ = frame;
    }

    /// A complete text message was received and decoded as UTF-8.
    fn on_text_message(&self, message: &str) {
        let _ = message;
    }

    /// A complete binary message was received.
    fn on_binary_message(&self, message: &[u8]) {
        let _ = message;
    }

    /// Reading or verifying a frame failed. `frame` is the offending frame
    /// when one was decoded before the failure.
    fn on_frame_error(&self, frame: Option<&Frame>, error: &WebSocketError) {
        let _ = (frame, error);
    }

    /// Assembling a fragmented message from its frames failed.
    fn on_message_error(&self, frames: &[Frame], error: &WebSocketError) {
        let _ = (frames, error);
    }

    /// A completed text message could not be decoded as UTF-8. Reception
    /// continues; `data` is the raw payload.
    fn on_text_message_error(&self, data: &[u8], error: &WebSocketError) {
        let _ = (data, error);
    }
}
