//! The reception loop: a cancellable task that pulls frames off an
//! established connection, verifies them, reassembles fragmented messages,
//! answers control traffic and drives the closing handshake.
//!
//! One [`Receiver`] runs per connection, as a background task distinct from
//! the application's writer path. Its lifecycle:
//!
//! 1. **Connected**: fire the `on_connected` notification once.
//! 2. **Reading**: repeatedly await one frame from the stream, racing the
//!    cancellation token. Verification failures, decode faults and transport
//!    faults are reported once via `on_frame_error`, answered with a
//!    synthesized close frame (best effort) and end this phase. A received
//!    close frame, or a failed message reassembly, ends it too.
//! 3. **Draining**: if no close frame was captured, wait a bounded time
//!    (default 60 seconds) for the peer's close frame, ignoring every other
//!    frame.
//! 4. **Finished**: resolve with the captured close frame, if any.
//!
//! Cancellation is cooperative: [`tokio_util::sync::CancellationToken`] both
//! sets the stop flag and wakes the pending read, and a wakeup caused by the
//! token never produces an error notification. A stop unblocks at most one
//! pending read. When it lands in the reading phase the drain still runs to
//! its watchdog deadline; otherwise it cuts the drain's wait short.

use std::{io, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{
    close::CloseCode,
    events::EventSink,
    frame::{Frame, OpCode},
    state::{CloseInitiator, SharedStateManager},
    verify::verify_frame,
    Result, WebSocketError,
};

/// The default maximum size of a reassembled message, set to 2 MiB.
///
/// When the combined payloads of a fragmented message exceed this limit the
/// message is dropped and the connection is closed with [`CloseCode::Size`],
/// to prevent unbounded memory growth from fragmented messages.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// How long the draining phase waits for the peer's close frame by default.
pub const CLOSE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a [`Receiver`].
///
/// ```rust
/// use std::time::Duration;
/// use wsrx::Options;
///
/// let options = Options::default()
///     .with_extended(true)
///     .with_close_wait_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Extended frame use: reserved bits and reserved opcodes pass through
    /// unchecked, for connections that negotiated an extension this crate
    /// does not interpret itself.
    pub extended: bool,
    /// Bound on the draining phase's wait for the peer's close frame.
    pub close_wait_timeout: Duration,
    /// Maximum size of a reassembled fragmented message.
    pub max_message_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            extended: false,
            close_wait_timeout: CLOSE_WAIT_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl Options {
    /// Enables or disables extended frame use.
    pub fn with_extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    /// Sets the bound on the draining phase's wait for a close frame.
    pub fn with_close_wait_timeout(mut self, timeout: Duration) -> Self {
        self.close_wait_timeout = timeout;
        self
    }

    /// Sets the maximum size of a reassembled message.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

/// Maps an error to the close code carried by the synthesized close frame.
///
/// Decode and protocol faults map to [`CloseCode::Protocol`], oversize
/// conditions to [`CloseCode::Size`], transport faults and anything
/// unclassified to [`CloseCode::Policy`].
pub fn close_code_for(error: &WebSocketError) -> CloseCode {
    match error {
        // In the frame decoder.
        WebSocketError::InsufficientData | WebSocketError::InvalidPayloadLength => {
            CloseCode::Protocol
        }
        WebSocketError::TooLongPayload
        | WebSocketError::InsufficientMemoryForPayload
        | WebSocketError::MessageConstruction => CloseCode::Size,

        // In frame verification.
        WebSocketError::NonZeroReservedBits(..)
        | WebSocketError::UnknownOpcode(_)
        | WebSocketError::FrameMasked
        | WebSocketError::FragmentedControlFrame
        | WebSocketError::UnexpectedContinuationFrame
        | WebSocketError::ContinuationNotClosed
        | WebSocketError::TooLongControlFramePayload(_) => CloseCode::Protocol,

        // While reading.
        WebSocketError::InterruptedInReading(_) | WebSocketError::IoErrorInReading(_) => {
            CloseCode::Policy
        }

        // Others (unexpected).
        _ => CloseCode::Policy,
    }
}

/// Distinguishes a genuine interruption from other I/O faults on the read
/// path. Decode errors pass through unchanged.
fn classify_read_error(error: WebSocketError) -> WebSocketError {
    match error {
        WebSocketError::IoError(err) if err.kind() == io::ErrorKind::Interrupted => {
            WebSocketError::InterruptedInReading(err)
        }
        WebSocketError::IoError(err) => WebSocketError::IoErrorInReading(err),
        other => other,
    }
}

/// Whether a frame handler lets the reading phase continue.
enum Control {
    Continue,
    Stop,
}

/// The frame-reception engine for one connection.
///
/// A `Receiver` is generic over the frame source: any
/// [`futures::Stream`] yielding `Result<Frame>` works, which in production is
/// a `tokio_util::codec::Framed` decoder and in tests a channel-backed
/// stream. Outbound frames (pong replies, close echoes and synthesized close
/// frames) are queued on an unbounded sender and are best effort: a writer
/// path that already went away does not fail the engine.
///
/// Run it to completion with [`Receiver::run`] or hand it to the runtime with
/// [`Receiver::spawn`]; either way the resolved value is the close frame
/// received from the peer, or `None` when the connection ended without one.
pub struct Receiver<S> {
    /// Source of decoded frames.
    stream: S,
    /// Best-effort outbound frame queue, drained by the writer path.
    outbound: UnboundedSender<Frame>,
    /// Listener notification capability.
    events: Arc<dyn EventSink>,
    /// Connection state shared with the writer path.
    state: SharedStateManager,
    /// Cooperative stop signal.
    token: CancellationToken,
    options: Options,
    /// Frames of the in-progress fragmented message. Non-empty only strictly
    /// between a non-final data frame and the final continuation frame.
    continuation: Vec<Frame>,
    /// The close frame received from the peer, at most one.
    close_frame: Option<Frame>,
    /// Set when a stop request unblocked the reading phase's pending read.
    /// A stop is consumed at most once: a consumed stop no longer cuts the
    /// draining phase short.
    stop_consumed: bool,
}

impl<S> Receiver<S>
where
    S: Stream<Item = Result<Frame>> + Unpin,
{
    /// Creates a reception engine for an established connection.
    ///
    /// # Parameters
    /// - `stream`: source of decoded frames.
    /// - `outbound`: queue for frames the engine must send (pongs, close
    ///   echoes, synthesized close frames); sends are best effort.
    /// - `events`: listener notification sink.
    /// - `state`: connection state shared with the writer path.
    /// - `token`: cancellation token; cancelling it stops the loop cleanly.
    /// - `options`: see [`Options`].
    pub fn new(
        stream: S,
        outbound: UnboundedSender<Frame>,
        events: Arc<dyn EventSink>,
        state: SharedStateManager,
        token: CancellationToken,
        options: Options,
    ) -> Self {
        Self {
            stream,
            outbound,
            events,
            state,
            token,
            options,
            continuation: Vec::new(),
            close_frame: None,
            stop_consumed: false,
        }
    }

    /// Spawns the reception loop as a dedicated task.
    ///
    /// The join handle resolves, exactly once, with the close frame received
    /// from the peer (or `None`).
    pub fn spawn(self) -> tokio::task::JoinHandle<Option<Frame>>
    where
        S: Send + 'static,
    {
        tokio::spawn(self.run())
    }

    /// Runs the reception loop to completion.
    ///
    /// Returns the close frame received from the peer, or `None` when the
    /// connection ended without one (cancellation, transport fault, or the
    /// draining phase timing out).
    pub async fn run(mut self) -> Option<Frame> {
        // Notify listeners that the connection is established.
        self.events.on_connected();

        loop {
            if self.token.is_cancelled() {
                break;
            }

            // Receive a frame from the server.
            let Some(frame) = self.read_frame().await else {
                // Stop requested, or something unexpected happened.
                break;
            };

            match self.handle_frame(frame) {
                Control::Continue => {}
                Control::Stop => break,
            }
        }

        // Wait for a close frame if one has not been received yet.
        self.wait_for_close_frame().await;

        #[cfg(feature = "logging")]
        log::debug!(
            "reception finished, close frame received: {}",
            self.close_frame.is_some()
        );

        self.close_frame
    }

    /// Reads and verifies one frame.
    ///
    /// Returns `None` when the reading phase must end: on a stop request
    /// (silently) or on any read, decode or verification fault (reported via
    /// `on_frame_error` and answered with a synthesized close frame).
    async fn read_frame(&mut self) -> Option<Frame> {
        let next = tokio::select! {
            biased;
            // Intentionally interrupted; not an error.
            _ = self.token.cancelled() => {
                self.stop_consumed = true;
                return None;
            }
            next = self.stream.next() => next,
        };

        let (frame, error) = match next {
            Some(Ok(frame)) => {
                let has_open_continuation = !self.continuation.is_empty();
                match verify_frame(&frame, self.options.extended, has_open_continuation) {
                    Ok(()) => return Some(frame),
                    Err(error) => (Some(frame), error),
                }
            }
            Some(Err(error)) => (None, classify_read_error(error)),
            // The stream ended before a frame was fully read.
            None => (None, WebSocketError::InsufficientData),
        };

        #[cfg(feature = "logging")]
        log::debug!("frame reception failed: {error}");

        // Notify the listeners that an error occurred while a frame was
        // being read, then answer with a close frame. Sending is best effort.
        self.events.on_frame_error(frame.as_ref(), &error);
        self.send_frame(Frame::close(close_code_for(&error), error.to_string()));

        None
    }

    /// Dispatches a verified frame by opcode.
    fn handle_frame(&mut self, frame: Frame) -> Control {
        // Notify the listeners that a frame was received.
        self.events.on_frame(&frame);

        match frame.opcode {
            OpCode::Continuation => self.handle_continuation_frame(frame),
            OpCode::Text | OpCode::Binary => self.handle_data_frame(frame),
            OpCode::Close => self.handle_close_frame(frame),
            OpCode::Ping => self.handle_ping_frame(frame),
            OpCode::Pong => self.handle_pong_frame(frame),
            // Reserved opcode, reachable only in extended mode. Keep reading.
            OpCode::Unknown(_) => Control::Continue,
        }
    }

    fn handle_continuation_frame(&mut self, frame: Frame) -> Control {
        self.events.on_continuation_frame(&frame);

        let fin = frame.fin;
        self.continuation.push(frame);

        if !fin {
            return Control::Continue;
        }

        // The continuation is complete; concatenate the payloads.
        let Some(data) = self.concatenate_payloads() else {
            self.continuation.clear();
            return Control::Stop;
        };

        // The message type is decided by the frame that opened the sequence.
        let opcode = self.continuation[0].opcode;
        self.deliver_message(opcode, data);

        self.continuation.clear();
        Control::Continue
    }

    /// Handles an unfragmented or fragment-opening text/binary frame.
    fn handle_data_frame(&mut self, frame: Frame) -> Control {
        match frame.opcode {
            OpCode::Text => self.events.on_text_frame(&frame),
            _ => self.events.on_binary_frame(&frame),
        }

        if !frame.fin {
            // Start a continuation sequence.
            self.continuation.push(frame);
            return Control::Continue;
        }

        let opcode = frame.opcode;
        self.deliver_message(opcode, frame.payload.unwrap_or_default());
        Control::Continue
    }

    fn handle_close_frame(&mut self, frame: Frame) -> Control {
        // The close frame sent from the server.
        self.close_frame = Some(frame.clone());

        {
            let mut manager = self.state.lock().expect("connection state lock poisoned");

            // If the current state is neither CLOSING nor CLOSED, this side
            // observed the open state first: transition and echo. The writer
            // path performs the same check-then-act under the same lock.
            if !manager.is_closing() && !manager.is_closed() {
                manager.transition_to_closing(CloseInitiator::Server);

                // RFC 6455, 5.5.1: the endpoint typically echos the status
                // code it received. Simply reuse the frame.
                self.send_frame(frame.clone());
            }
        }

        // Notify outside the lock.
        self.events.on_close_frame(&frame);

        Control::Stop
    }

    fn handle_ping_frame(&mut self, frame: Frame) -> Control {
        self.events.on_ping_frame(&frame);

        // RFC 6455, 5.5.3: a pong sent in response to a ping must have
        // identical application data.
        self.send_frame(Frame::pong(frame.payload.clone()));

        Control::Continue
    }

    fn handle_pong_frame(&mut self, frame: Frame) -> Control {
        self.events.on_pong_frame(&frame);
        Control::Continue
    }

    /// Concatenates the buffered payloads into one message, skipping absent
    /// and empty payloads.
    ///
    /// Returns `None` when the combined size exceeds the configured limit; in
    /// that case the failure has been reported via `on_message_error` and a
    /// close frame with [`CloseCode::Size`] has been queued.
    fn concatenate_payloads(&mut self) -> Option<Bytes> {
        let total: usize = self.continuation.iter().map(Frame::payload_len).sum();

        if total <= self.options.max_message_size {
            let mut data = BytesMut::with_capacity(total);
            for frame in &self.continuation {
                match frame.payload.as_deref() {
                    Some(payload) if !payload.is_empty() => data.extend_from_slice(payload),
                    _ => continue,
                }
            }
            return Some(data.freeze());
        }

        let error = WebSocketError::MessageConstruction;

        // Notify the listeners that message construction failed, and close
        // with 1009: the message is too big to process.
        self.events.on_message_error(&self.continuation, &error);
        self.send_frame(Frame::close(CloseCode::Size, error.to_string()));

        None
    }

    /// Delivers a completed message, decoding text payloads as UTF-8.
    ///
    /// A UTF-8 failure is reported via `on_text_message_error` and is not
    /// fatal; reception continues.
    fn deliver_message(&self, opcode: OpCode, data: Bytes) {
        if opcode == OpCode::Text {
            match std::str::from_utf8(&data) {
                Ok(message) => self.events.on_text_message(message),
                Err(err) => {
                    let error = WebSocketError::TextMessageConstruction(err);
                    self.events.on_text_message_error(&data, &error);
                }
            }
        } else {
            self.events.on_binary_message(&data);
        }
    }

    /// The draining phase: a bounded wait for the peer's close frame.
    ///
    /// Skipped entirely when a close frame was already captured. Every frame
    /// other than a close frame is ignored; the wait ends on a close frame,
    /// a read fault, the end of the stream, or the watchdog deadline. The
    /// deadline future is dropped on every exit path, so the watchdog can
    /// never fire after the loop has finished.
    ///
    /// A stop request also ends the wait, but only while the stop has not
    /// been consumed yet: a stop that already unblocked the reading phase
    /// leaves the drain bounded by the watchdog alone.
    async fn wait_for_close_frame(&mut self) {
        // If a close frame has already been received.
        if self.close_frame.is_some() {
            return;
        }

        let deadline = tokio::time::sleep(self.options.close_wait_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.token.cancelled(), if !self.stop_consumed => {
                    #[cfg(feature = "logging")]
                    log::debug!("stop requested while waiting for the peer's close frame");
                    break;
                }
                _ = &mut deadline => {
                    #[cfg(feature = "logging")]
                    log::debug!("gave up waiting for the peer's close frame");
                    break;
                }
                next = self.stream.next() => match next {
                    Some(Ok(frame)) if frame.opcode == OpCode::Close => {
                        // Received a close frame. Finished.
                        self.close_frame = Some(frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    // Give up receiving a close frame.
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    /// Best-effort send: the writer path may already be gone.
    fn send_frame(&self, frame: Frame) {
        let _ = self.outbound.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConnectionState, StateManager};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Connected,
        Frame(OpCode),
        ContinuationFrame,
        TextFrame,
        BinaryFrame,
        CloseFrame,
        PingFrame,
        PongFrame,
        TextMessage(String),
        BinaryMessage(Vec<u8>),
        FrameError(String),
        MessageError(usize),
        TextMessageError(Vec<u8>),
    }

    /// Records every notification for later assertions.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut self.events.lock().unwrap())
        }
    }

    impl EventSink for Recorder {
        fn on_connected(&self) {
            self.push(Event::Connected);
        }
        fn on_frame(&self, frame: &Frame) {
            self.push(Event::Frame(frame.opcode));
        }
        fn on_continuation_frame(&self, _frame: &Frame) {
            self.push(Event::ContinuationFrame);
        }
        fn on_text_frame(&self, _frame: &Frame) {
            self.push(Event::TextFrame);
        }
        fn on_binary_frame(&self, _frame: &Frame) {
            self.push(Event::BinaryFrame);
        }
        fn on_close_frame(&self, _frame: &Frame) {
            self.push(Event::CloseFrame);
        }
        fn on_ping_frame(&self, _frame: &Frame) {
            self.push(Event::PingFrame);
        }
        fn on_pong_frame(&self, _frame: &Frame) {
            self.push(Event::PongFrame);
        }
        fn on_text_message(&self, message: &str) {
            self.push(Event::TextMessage(message.to_owned()));
        }
        fn on_binary_message(&self, message: &[u8]) {
            self.push(Event::BinaryMessage(message.to_vec()));
        }
        fn on_frame_error(&self, _frame: Option<&Frame>, error: &WebSocketError) {
            self.push(Event::FrameError(error.to_string()));
        }
        fn on_message_error(&self, frames: &[Frame], _error: &WebSocketError) {
            self.push(Event::MessageError(frames.len()));
        }
        fn on_text_message_error(&self, data: &[u8], _error: &WebSocketError) {
            self.push(Event::TextMessageError(data.to_vec()));
        }
    }

    struct Harness {
        frames: mpsc::UnboundedSender<Result<Frame>>,
        outbound: mpsc::UnboundedReceiver<Frame>,
        events: Arc<Recorder>,
        state: SharedStateManager,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<Option<Frame>>,
    }

    fn spawn_receiver(options: Options) -> Harness {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let events = Arc::new(Recorder::default());
        let state = StateManager::shared();
        let token = CancellationToken::new();

        let receiver = Receiver::new(
            UnboundedReceiverStream::new(frame_rx),
            out_tx,
            Arc::clone(&events) as Arc<dyn EventSink>,
            Arc::clone(&state),
            token.clone(),
            options,
        );
        let handle = receiver.spawn();

        Harness {
            frames: frame_tx,
            outbound: out_rx,
            events,
            state,
            token,
            handle,
        }
    }

    fn short_timeouts() -> Options {
        Options::default().with_close_wait_timeout(Duration::from_millis(50))
    }

    fn send(harness: &Harness, frame: Frame) {
        harness.frames.send(Ok(frame)).unwrap();
    }

    #[tokio::test]
    async fn test_reassembles_fragmented_text_message() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::text("AB").with_fin(false));
        send(&harness, Frame::continuation("CD").with_fin(false));
        send(&harness, Frame::continuation("EF"));
        send(&harness, Frame::close(CloseCode::Normal, "bye"));

        let pending = harness.handle.await.unwrap();
        assert_eq!(pending.unwrap().close_code(), Some(CloseCode::Normal));

        let events = harness.events.take();
        let messages: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::TextMessage(_)))
            .collect();
        assert_eq!(messages, vec![&Event::TextMessage("ABCDEF".into())]);

        // Per-frame notifications still fire for every fragment.
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::ContinuationFrame))
                .count(),
            2
        );
        assert!(events.contains(&Event::TextFrame));
    }

    #[tokio::test]
    async fn test_unfragmented_messages_bypass_the_buffer() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::text("one"));
        send(&harness, Frame::binary(vec![1, 2, 3]));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let events = harness.events.take();
        assert!(events.contains(&Event::TextMessage("one".into())));
        assert!(events.contains(&Event::BinaryMessage(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn test_ping_answered_with_byte_identical_pong() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::ping(Some(Bytes::from_static(b"payload"))));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let pong = harness.outbound.recv().await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload_bytes(), b"payload");

        assert!(harness.events.take().contains(&Event::PingFrame));
    }

    #[tokio::test]
    async fn test_ping_without_payload_answered_without_payload() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::ping(None));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let pong = harness.outbound.recv().await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert!(pong.payload.is_none());
    }

    #[tokio::test]
    async fn test_close_while_open_transitions_and_echoes() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::close(CloseCode::Normal, "done"));

        let pending = harness.handle.await.unwrap().unwrap();
        assert_eq!(pending.close_code(), Some(CloseCode::Normal));
        assert_eq!(pending.close_reason(), Some("done"));

        // The state moved to CLOSING with the peer as initiator.
        let manager = harness.state.lock().unwrap();
        assert_eq!(manager.state(), ConnectionState::Closing);
        assert_eq!(manager.close_initiator(), Some(CloseInitiator::Server));
        drop(manager);

        // The echo reuses the identical code and reason.
        let echo = harness.outbound.recv().await.unwrap();
        assert_eq!(echo.opcode, OpCode::Close);
        assert_eq!(echo.close_code(), Some(CloseCode::Normal));
        assert_eq!(echo.close_reason(), Some("done"));

        assert!(harness.events.take().contains(&Event::CloseFrame));
    }

    #[tokio::test]
    async fn test_close_after_local_close_neither_echoes_nor_retransitions() {
        let mut harness = spawn_receiver(Options::default());

        // The writer path initiated closing first, under the shared lock.
        {
            let mut manager = harness.state.lock().unwrap();
            if !manager.is_closing() && !manager.is_closed() {
                manager.transition_to_closing(CloseInitiator::Client);
            }
        }

        send(&harness, Frame::close(CloseCode::Normal, "ok"));

        let pending = harness.handle.await.unwrap();
        assert!(pending.is_some());

        // No echo was queued.
        assert!(harness.outbound.recv().await.is_none());

        // The initiator stays CLIENT and the notification still fired.
        assert_eq!(
            harness.state.lock().unwrap().close_initiator(),
            Some(CloseInitiator::Client)
        );
        assert!(harness.events.take().contains(&Event::CloseFrame));
    }

    #[tokio::test]
    async fn test_stop_request_ends_loop_without_error_report() {
        let harness = spawn_receiver(short_timeouts());

        // Let the loop reach its blocking read, then request a stop.
        tokio::task::yield_now().await;
        harness.token.cancel();

        let pending = harness.handle.await.unwrap();
        assert!(pending.is_none());

        let events = harness.events.take();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::FrameError(_)))
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn test_stop_request_unblocks_the_drain() {
        let mut harness = spawn_receiver(Options::default());

        // A masked frame ends the reading phase; the drain starts with its
        // default 60 second watchdog.
        send(&harness, Frame::text("x").with_masked(true));

        // Let the drain reach its blocking read, then request a stop.
        tokio::task::yield_now().await;
        harness.token.cancel();

        let pending = tokio::time::timeout(Duration::from_secs(5), harness.handle)
            .await
            .expect("a stop request must end the drain before the watchdog")
            .unwrap();
        assert!(pending.is_none());

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Protocol));
    }

    #[tokio::test]
    async fn test_consumed_stop_still_drains_for_the_close_frame() {
        let harness = spawn_receiver(short_timeouts());

        // Let the reading phase reach its blocking read; the stop request is
        // consumed by that read.
        tokio::task::yield_now().await;
        harness.token.cancel();

        // The drain still runs and captures the peer's close frame.
        send(&harness, Frame::close(CloseCode::Normal, "late"));

        let pending = harness.handle.await.unwrap();
        assert_eq!(pending.unwrap().close_code(), Some(CloseCode::Normal));
    }

    #[tokio::test]
    async fn test_drain_times_out_when_no_close_frame_arrives() {
        let mut harness = spawn_receiver(short_timeouts());

        // A masked frame ends the reading phase with a protocol violation.
        send(&harness, Frame::text("x").with_masked(true));

        // No close frame ever arrives; the watchdog must end the drain.
        let pending = harness.handle.await.unwrap();
        assert!(pending.is_none());

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(close.close_code(), Some(CloseCode::Protocol));

        let events = harness.events.take();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::FrameError(msg) if msg.contains("masked"))));
    }

    #[tokio::test]
    async fn test_drain_ignores_data_frames_and_captures_close() {
        let mut harness = spawn_receiver(short_timeouts());

        send(&harness, Frame::continuation("tail")); // protocol violation
        send(&harness, Frame::text("ignored during drain"));
        send(&harness, Frame::close(CloseCode::Away, ""));

        let pending = harness.handle.await.unwrap().unwrap();
        assert_eq!(pending.close_code(), Some(CloseCode::Away));

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Protocol));

        // The ignored text frame produced no notifications.
        let events = harness.events.take();
        assert!(!events.contains(&Event::TextFrame));
    }

    #[tokio::test]
    async fn test_violation_reports_once_and_sends_protocol_close() {
        let mut harness = spawn_receiver(short_timeouts());

        send(&harness, Frame::text("next").with_fin(false));
        send(&harness, Frame::binary(vec![0])); // continuation not closed
        drop(harness.frames);

        harness.handle.await.unwrap();

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Protocol));

        let events = harness.events.take();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::FrameError(_)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_stream_end_reported_as_insufficient_data() {
        let mut harness = spawn_receiver(short_timeouts());

        drop(harness.frames);

        let pending = harness.handle.await.unwrap();
        assert!(pending.is_none());

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Protocol));
    }

    #[tokio::test]
    async fn test_io_error_maps_to_policy_close() {
        let mut harness = spawn_receiver(short_timeouts());

        harness
            .frames
            .send(Err(WebSocketError::IoError(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset",
            ))))
            .unwrap();
        drop(harness.frames);

        harness.handle.await.unwrap();

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Policy));
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_is_not_fatal() {
        let mut harness = spawn_receiver(Options::default());

        let bad = Frame::new(OpCode::Text, Some(Bytes::from_static(&[0xFF, 0xFE, 0xFD])));
        send(&harness, bad);
        send(&harness, Frame::text("still alive"));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let events = harness.events.take();
        assert!(events.contains(&Event::TextMessageError(vec![0xFF, 0xFE, 0xFD])));
        assert!(events.contains(&Event::TextMessage("still alive".into())));
    }

    #[tokio::test]
    async fn test_oversize_reassembly_stops_with_size_close() {
        let mut harness = spawn_receiver(short_timeouts().with_max_message_size(8));

        send(&harness, Frame::text("0123").with_fin(false));
        send(&harness, Frame::continuation("456789"));
        // The loop stops; hand it the close frame it is now draining for.
        send(&harness, Frame::close(CloseCode::Normal, ""));

        let pending = harness.handle.await.unwrap();
        assert!(pending.is_some());

        let close = harness.outbound.recv().await.unwrap();
        assert_eq!(close.close_code(), Some(CloseCode::Size));

        let events = harness.events.take();
        assert!(events.contains(&Event::MessageError(2)));
        assert!(!events.iter().any(|e| matches!(e, Event::TextMessage(_))));
    }

    #[tokio::test]
    async fn test_control_frames_interleave_inside_continuation() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::binary(vec![1]).with_fin(false));
        send(&harness, Frame::ping(Some(Bytes::from_static(b"mid"))));
        send(&harness, Frame::continuation(vec![2, 3]));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let pong = harness.outbound.recv().await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);

        let events = harness.events.take();
        assert!(events.contains(&Event::BinaryMessage(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn test_extended_mode_passes_unknown_opcodes_through() {
        let mut harness = spawn_receiver(short_timeouts().with_extended(true));

        send(&harness, Frame::new(OpCode::Unknown(0x3), None));
        send(&harness, Frame::text("after").with_rsv1(true));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let events = harness.events.take();
        assert!(events.contains(&Event::Frame(OpCode::Unknown(0x3))));
        assert!(events.contains(&Event::TextMessage("after".into())));
        assert!(!events.iter().any(|e| matches!(e, Event::FrameError(_))));
    }

    #[tokio::test]
    async fn test_connected_fires_first_and_once() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::close(CloseCode::Normal, ""));
        harness.handle.await.unwrap();

        let events = harness.events.take();
        assert_eq!(events.first(), Some(&Event::Connected));
        assert_eq!(
            events.iter().filter(|e| **e == Event::Connected).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_pong_only_notifies() {
        let mut harness = spawn_receiver(Options::default());

        send(&harness, Frame::pong(Some(Bytes::from_static(b"late"))));
        send(&harness, Frame::close(CloseCode::Normal, ""));

        harness.handle.await.unwrap();

        let events = harness.events.take();
        assert!(events.contains(&Event::PongFrame));

        // Only the close echo goes out, nothing in response to the pong.
        let first_out = harness.outbound.recv().await.unwrap();
        assert_eq!(first_out.opcode, OpCode::Close);
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(
            close_code_for(&WebSocketError::InsufficientData),
            CloseCode::Protocol
        );
        assert_eq!(
            close_code_for(&WebSocketError::InvalidPayloadLength),
            CloseCode::Protocol
        );
        assert_eq!(
            close_code_for(&WebSocketError::TooLongPayload),
            CloseCode::Size
        );
        assert_eq!(
            close_code_for(&WebSocketError::InsufficientMemoryForPayload),
            CloseCode::Size
        );
        assert_eq!(
            close_code_for(&WebSocketError::MessageConstruction),
            CloseCode::Size
        );
        for violation in [
            WebSocketError::NonZeroReservedBits(true, false, false),
            WebSocketError::UnknownOpcode(0x3),
            WebSocketError::FrameMasked,
            WebSocketError::FragmentedControlFrame,
            WebSocketError::UnexpectedContinuationFrame,
            WebSocketError::ContinuationNotClosed,
            WebSocketError::TooLongControlFramePayload(126),
        ] {
            assert_eq!(close_code_for(&violation), CloseCode::Protocol);
        }
        let interrupted = WebSocketError::InterruptedInReading(io::Error::new(
            io::ErrorKind::Interrupted,
            "interrupted",
        ));
        assert_eq!(close_code_for(&interrupted), CloseCode::Policy);
        let io_error =
            WebSocketError::IoErrorInReading(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert_eq!(close_code_for(&io_error), CloseCode::Policy);
        // Anything unclassified maps to the abnormal-closure code.
        let other = WebSocketError::IoError(io::Error::new(io::ErrorKind::Other, "other"));
        assert_eq!(close_code_for(&other), CloseCode::Policy);
    }

    #[test]
    fn test_classify_read_error() {
        let interrupted = classify_read_error(WebSocketError::IoError(io::Error::new(
            io::ErrorKind::Interrupted,
            "interrupted",
        )));
        assert!(matches!(
            interrupted,
            WebSocketError::InterruptedInReading(_)
        ));

        let reset = classify_read_error(WebSocketError::IoError(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(matches!(reset, WebSocketError::IoErrorInReading(_)));

        // Decode faults pass through unchanged.
        let decode = classify_read_error(WebSocketError::InvalidPayloadLength);
        assert!(matches!(decode, WebSocketError::InvalidPayloadLength));
    }
}
