//! Frame verification: the protocol-conformance checks applied to every
//! decoded frame before it is dispatched.
//!
//! The checks follow RFC 6455 and run in a fixed order; the first failure
//! wins. Fragmentation legality depends on whether a fragmented message is
//! currently open, which only the reception loop knows, so the caller passes
//! the continuation-buffer occupancy in.

use crate::{
    frame::{Frame, OpCode},
    Result, WebSocketError,
};

/// Maximum control-frame payload size from RFC 6455, 5.5.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// Verifies a decoded frame against the protocol rules.
///
/// # Parameters
/// - `frame`: the decoded frame to check.
/// - `extended`: whether extended frame use was negotiated. In extended mode
///   the reserved bits and reserved opcodes are passed through unchecked.
/// - `has_open_continuation`: whether a fragmented message is currently open
///   (the continuation buffer is non-empty).
///
/// # Checks, in order (first failure wins)
/// 1. Reserved bits must be zero unless in extended mode.
/// 2. The opcode must be one of the six defined values; reserved opcodes are
///    tolerated only in extended mode.
/// 3. A frame from the server must not be masked.
/// 4. Fragmentation legality (see [`verify_fragmentation`]).
/// 5. A control frame payload must not exceed 125 bytes.
pub fn verify_frame(frame: &Frame, extended: bool, has_open_continuation: bool) -> Result<()> {
    verify_reserved_bits(frame, extended)?;
    verify_opcode(frame, extended)?;
    verify_mask(frame)?;
    verify_fragmentation(frame, has_open_continuation)?;
    verify_size(frame)?;

    Ok(())
}

/// RSV1, RSV2, RSV3 must "be 0 unless an extension is negotiated that defines
/// meanings for non-zero values" (RFC 6455, 5.2).
fn verify_reserved_bits(frame: &Frame, extended: bool) -> Result<()> {
    if extended {
        return Ok(());
    }

    if frame.has_reserved_bits() {
        return Err(WebSocketError::NonZeroReservedBits(
            frame.rsv1, frame.rsv2, frame.rsv3,
        ));
    }

    Ok(())
}

/// "If an unknown opcode is received, the receiving endpoint MUST Fail the
/// WebSocket Connection" (RFC 6455, 5.2), unless extended frame use was
/// negotiated, in which case the frame passes through for the application to
/// interpret.
fn verify_opcode(frame: &Frame, extended: bool) -> Result<()> {
    match frame.opcode {
        OpCode::Unknown(code) if !extended => Err(WebSocketError::UnknownOpcode(code)),
        _ => Ok(()),
    }
}

/// "A server MUST NOT mask any frames that it sends to the client. A client
/// MUST close a connection if it detects a masked frame" (RFC 6455, 5.1).
fn verify_mask(frame: &Frame) -> Result<()> {
    if frame.masked {
        return Err(WebSocketError::FrameMasked);
    }

    Ok(())
}

/// Fragmentation rules from RFC 6455, 5.4 and 5.5:
///
/// - Control frames may be injected in the middle of a fragmented message but
///   must never themselves be fragmented.
/// - A continuation frame is only legal while a fragmented message is open.
/// - A new data frame is only legal while no fragmented message is open.
fn verify_fragmentation(frame: &Frame, has_open_continuation: bool) -> Result<()> {
    if frame.is_control() {
        if !frame.fin {
            return Err(WebSocketError::FragmentedControlFrame);
        }

        // No more requirements on a control frame; it may interleave freely.
        return Ok(());
    }

    if frame.opcode == OpCode::Continuation {
        if !has_open_continuation {
            return Err(WebSocketError::UnexpectedContinuationFrame);
        }

        return Ok(());
    }

    // A data frame.
    if has_open_continuation {
        return Err(WebSocketError::ContinuationNotClosed);
    }

    Ok(())
}

/// "All control frames MUST have a payload length of 125 bytes or less"
/// (RFC 6455, 5.5). An absent payload trivially passes.
fn verify_size(frame: &Frame) -> Result<()> {
    if !frame.is_control() {
        return Ok(());
    }

    let len = frame.payload_len();
    if len > MAX_CONTROL_PAYLOAD {
        return Err(WebSocketError::TooLongControlFramePayload(len));
    }

    Ok(())
}
