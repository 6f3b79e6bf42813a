//! Shared connection state and the closing-handshake transition.
//!
//! The connection state is the one resource both sides of a connection touch:
//! the reception loop moves it to [`ConnectionState::Closing`] when the peer's
//! close frame arrives, and the writer path moves it there when the local side
//! initiates closure. Both go through the same [`SharedStateManager`] so the
//! check-then-act on the CLOSING transition is atomic and the two sides can
//! never both believe they initiated the close.

use std::sync::{Arc, Mutex};

/// Lifecycle states of a WebSocket connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The connection object exists but no socket work has started.
    Created,
    /// The opening handshake is in progress.
    Connecting,
    /// The connection is established and frames flow in both directions.
    Open,
    /// A close frame has been sent or received; the closing handshake is in
    /// progress.
    Closing,
    /// The closing handshake has completed.
    Closed,
}

/// Which side started the closing handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseInitiator {
    /// The local side sent the first close frame.
    Client,
    /// The peer sent the first close frame.
    Server,
}

/// The state-plus-initiator pair for one connection.
///
/// Always accessed through a [`SharedStateManager`]; the mutex is the single
/// exclusion mechanism shared with the writer path.
#[derive(Debug)]
pub struct StateManager {
    state: ConnectionState,
    close_initiator: Option<CloseInitiator>,
}

/// Handle shared between the reception loop and the writer path.
pub type SharedStateManager = Arc<Mutex<StateManager>>;

impl StateManager {
    /// Creates a manager in the [`ConnectionState::Created`] state.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Created,
            close_initiator: None,
        }
    }

    /// Creates a manager already wrapped for sharing, in the
    /// [`ConnectionState::Open`] state. This is the usual entry point: the
    /// reception engine only runs on an established connection.
    pub fn shared() -> SharedStateManager {
        let mut manager = Self::new();
        manager.state = ConnectionState::Open;
        Arc::new(Mutex::new(manager))
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Which side initiated the close, once the CLOSING transition happened.
    pub fn close_initiator(&self) -> Option<CloseInitiator> {
        self.close_initiator
    }

    /// Returns `true` while the closing handshake is in progress.
    pub fn is_closing(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    /// Returns `true` once the closing handshake has completed.
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Moves the connection into [`ConnectionState::Connecting`].
    pub fn set_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Moves the connection into [`ConnectionState::Open`].
    pub fn set_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    /// Moves the connection into [`ConnectionState::Closing`] and records the
    /// initiator, keeping the first initiator if the transition already
    /// happened.
    ///
    /// Callers must hold the shared lock across their own
    /// is-closing/is-closed check and this call, so whichever side observes
    /// the pre-CLOSING state first performs the transition exactly once.
    pub fn transition_to_closing(&mut self, initiator: CloseInitiator) {
        self.state = ConnectionState::Closing;
        if self.close_initiator.is_none() {
            self.close_initiator = Some(initiator);
        }
    }

    /// Moves the connection into [`ConnectionState::Closed`].
    pub fn set_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
