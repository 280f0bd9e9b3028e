//! Reader session state.
//!
//! A [`ReaderSession`] exists from connect to disconnect and is mutated
//! exclusively by the engine. It tracks the connection state machine, the
//! current operating mode, the scanning flag, and the active settings.
//!
//! Connection transitions are validated against the declared state machine;
//! the one escape hatch is [`force_disconnected`](ReaderSession::force_disconnected),
//! which every failure path uses so the session always lands in a declared
//! state.

use std::collections::VecDeque;
use std::time::Instant;

use taglink_core::{ConnectionState, Error, ReaderMode, ReaderSettings, Result};
use uuid::Uuid;

/// Maximum number of state changes kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 32;

/// One recorded connection-state change.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: Instant,
}

/// The aggregate session object.
#[derive(Debug)]
pub struct ReaderSession {
    id: Uuid,
    state: ConnectionState,
    mode: Option<ReaderMode>,
    scanning: bool,
    settings: ReaderSettings,
    history: VecDeque<StateChange>,
}

impl ReaderSession {
    /// Create a session in the `Disconnected` state with the given settings.
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Disconnected,
            mode: None,
            scanning: false,
            settings,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Session identifier, stable for the session's lifetime.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current mode; `None` while not connected.
    pub fn mode(&self) -> Option<ReaderMode> {
        self.mode
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Recorded state changes, oldest first.
    pub fn history(&self) -> &VecDeque<StateChange> {
        &self.history
    }

    /// Transition the connection state, validating against the state machine.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` for transitions the state
    /// machine does not declare.
    pub fn set_state(&mut self, state: ConnectionState) -> Result<()> {
        if !self.state.can_transition_to(&state) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: state.to_string(),
            });
        }
        self.record_change(state);
        if !state.is_connected() {
            self.mode = None;
            self.scanning = false;
        }
        Ok(())
    }

    /// Force the session to `Disconnected` regardless of current state.
    ///
    /// Used by error recovery and by disconnect paths where a best-effort
    /// stop may already have failed.
    pub fn force_disconnected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.record_change(ConnectionState::Disconnected);
        }
        self.mode = None;
        self.scanning = false;
    }

    /// Set the operating mode. Requires a connected session.
    ///
    /// # Errors
    /// Returns `Error::NotConnected` if the session is not connected.
    pub fn set_mode(&mut self, mode: ReaderMode) -> Result<()> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }
        self.mode = Some(mode);
        self.scanning = false;
        Ok(())
    }

    pub fn set_scanning(&mut self, scanning: bool) {
        self.scanning = scanning;
    }

    pub fn set_settings(&mut self, settings: ReaderSettings) {
        self.settings = settings;
    }

    fn record_change(&mut self, to: ConnectionState) {
        let change = StateChange {
            from: self.state,
            to,
            at: Instant::now(),
        };
        self.state = to;
        self.history.push_back(change);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}
