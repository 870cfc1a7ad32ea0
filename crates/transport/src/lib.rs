//! Reliable duplex line transport to the vehicle, plus clock synchronisation.
//!
//! One task owns the socket for the lifetime of a connection attempt,
//! selecting between reading inbound lines and draining the outbound
//! queue, and the whole thing is wrapped in a reconnect loop that
//! survives transient I/O failures.

pub mod clock;
pub mod line;

pub use clock::{ClockConfig, ClockSync};
pub use line::{LineTransport, OutboundLine, TransportConfig, TransportError};

fn now_ms() -> types::Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as types::Timestamp)
        .unwrap_or(0)
}
