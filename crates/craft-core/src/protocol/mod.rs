//! Protocol module containing message types, stream framing and the text codec.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{decode_message, encode, encode_message, ProtocolError};
pub use framing::{decode_stream, StreamDecoder};
pub use messages::*;
