//! Wire layer for the generals session bridge
//!
//! This crate provides:
//! - Client and server message types with the line codec
//! - Newline framing with partial-line accumulation
//! - Transport abstractions (AsyncReader/AsyncWriter traits)
//! - TCP transport

pub mod protocol;
pub mod tcp;
pub mod transport;

pub use protocol::{ClientMessage, ServerMessage, decode, decode_server, encode};
pub use transport::{
    AsyncReader, AsyncWriter, DEFAULT_MAX_FRAME, LineBuffer, LineReader, LineWriter,
};
