//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the client's TOML file and turns it into the
//! [`ConnectionConfig`](super::network::ConnectionConfig) the network layer
//! runs on.  A missing file is not an error; every value has a default.

pub mod config;
