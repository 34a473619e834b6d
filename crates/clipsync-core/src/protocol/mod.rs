//! Protocol module containing message types and the line codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_line, encode_update, LineBuffer, ProtocolError};
pub use messages::*;
