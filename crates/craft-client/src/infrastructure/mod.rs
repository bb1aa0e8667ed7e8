//! Infrastructure layer for the client.
//!
//! # Sub-modules
//!
//! - **`network`** – the self-healing game server connection: connect and
//!   reconnect loop, outbound queue, stream reassembly, keepalive, and the
//!   per-connection event bus.
//!
//! - **`storage`** – TOML configuration loading for the binary.

pub mod network;
pub mod storage;
