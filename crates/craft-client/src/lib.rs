//! craft-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client keeps one TCP connection to a Craft game server alive for as
//! long as the caller wants it:
//!
//! 1. Connects, and reconnects after a fixed delay whenever the socket is
//!    lost, times out, or delivers something unparsable.
//! 2. Queues outbound commands while offline and flushes them, in order, once
//!    a socket is up.
//! 3. Reassembles the server's newline-delimited stream and publishes every
//!    message as a typed [`Event`](infrastructure::network::Event).
//! 4. Announces the protocol version on a fixed keepalive period.

/// Infrastructure layer: network connection and configuration loading.
pub mod infrastructure;

pub use infrastructure::network::{
    Connection, ConnectionConfig, ConnectionError, Event, EventName, Outbox, Phase,
};
