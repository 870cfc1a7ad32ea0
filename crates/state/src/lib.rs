//! Connection state machine for the vehicle line transport.

use tracing::{info, warn};

/// Events that trigger transport state transitions.
#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// A connection attempt started.
    ConnectStart,
    /// The socket connected successfully.
    Connected,
    /// Connect attempt failed (timeout or refused).
    ConnectFailed,
    /// An I/O error occurred on an established connection.
    IoError,
    /// `shutdown()` was called.
    Shutdown,
}

/// Connection lifecycle of the line transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// State machine driving one `LineTransport` instance.
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Process an event and return the new state.
    pub fn transition(&mut self, event: Event) -> ConnectionState {
        let old_state = self.state;

        self.state = match (self.state, event) {
            (ConnectionState::Disconnected, Event::ConnectStart) => ConnectionState::Connecting,
            (ConnectionState::Connecting, Event::Connected) => ConnectionState::Connected,
            (ConnectionState::Connecting, Event::ConnectFailed) => {
                warn!("connect attempt failed, will retry");
                ConnectionState::Disconnected
            }
            (ConnectionState::Connected, Event::IoError) => {
                warn!("transport I/O error, reconnecting");
                ConnectionState::Disconnected
            }
            (ConnectionState::Connecting, Event::IoError) => ConnectionState::Disconnected,
            (_, Event::Shutdown) => ConnectionState::Closed,
            (state, _) => state,
        };

        if self.state != old_state {
            info!(?old_state, new_state = ?self.state, ?event, "connection state transition");
        }

        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut m = ConnectionMachine::new();
        assert_eq!(m.state(), ConnectionState::Disconnected);

        m.transition(Event::ConnectStart);
        assert_eq!(m.state(), ConnectionState::Connecting);

        m.transition(Event::Connected);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(m.is_connected());
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        let mut m = ConnectionMachine::new();
        m.transition(Event::ConnectStart);
        m.transition(Event::ConnectFailed);
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_io_error_from_connected_reconnects() {
        let mut m = ConnectionMachine::new();
        m.transition(Event::ConnectStart);
        m.transition(Event::Connected);
        m.transition(Event::IoError);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.is_connected());
    }

    #[test]
    fn test_shutdown_from_any_state_is_terminal() {
        for events in [
            vec![],
            vec![Event::ConnectStart],
            vec![Event::ConnectStart, Event::Connected],
        ] {
            let mut m = ConnectionMachine::new();
            for e in events {
                m.transition(e);
            }
            m.transition(Event::Shutdown);
            assert_eq!(m.state(), ConnectionState::Closed);
            assert!(m.is_terminal());
        }
    }

    #[test]
    fn test_no_transition_from_disconnected_on_io_error() {
        let mut m = ConnectionMachine::new();
        m.transition(Event::IoError);
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_default_impl() {
        let m = ConnectionMachine::default();
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }
}
