//! Device protocol: message types and the codec that maps WebSocket payloads
//! onto them.

pub mod codec;
pub mod messages;

pub use codec::{decode_binary, decode_text, encode_command, CodecError, MIN_FRAME_BYTES};
pub use messages::*;
