//! # craft-core
//!
//! Wire protocol for the Craft game server: stream framing, the per-command
//! field grammar, and the message codec.
//!
//! This crate has no dependency on sockets or an async runtime.  The
//! connection manager in `craft-client` feeds it raw bytes and gets typed
//! [`Message`]s back.
//!
//! # Protocol overview
//!
//! The server speaks a line-oriented ASCII protocol.  Each line is one
//! message: a single-character command code, a comma, and comma-separated
//! fields.  Position updates, for example, look like
//!
//! ```text
//! U,1,2.0,3.0,4.0,5.0,6.0
//! ```
//!
//! - **`protocol::framing`** turns a chunked byte stream into complete lines.
//! - **`protocol::codec`** turns one line into a [`Message`] and back.
//! - **`protocol::messages`** holds the field types and the fixed
//!   [`FieldTypeTable`].

pub mod protocol;

pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::framing::{decode_stream, StreamDecoder};
pub use protocol::messages::{Field, FieldType, FieldTypeTable, Message};
