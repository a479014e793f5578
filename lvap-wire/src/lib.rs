//! Binary control-channel protocol spoken between an access point agent and its
//! controller.
//!
//! Every message starts with an 8-byte [`Header`] (all integers in network byte
//! order) followed by a type-specific body. The header's `length` covers the
//! whole message, header included, and is the only way to find the next message
//! in a buffer.

use thiserror::Error;

mod buf;

mod header;
pub use header::{Header, MsgType, HEADER_LEN, PROTOCOL_VERSION};

mod types;
pub use types::*;

mod message;
pub use message::*;

mod codec;
pub use codec::{decode_all, encode, Codec, Decoded, Packet};

/// Errors of encoding and decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Socket failure.
    #[error("IO error: {0}")]
    Io(String),
    /// Fewer bytes left than a field needs.
    #[error("truncated {what}: needed {needed} bytes, {remaining} remaining")]
    Truncated { what: &'static str, needed: usize, remaining: usize },
    /// The header declares an impossible length.
    #[error("invalid declared length {declared} (remaining {remaining})")]
    InvalidLength { declared: usize, remaining: usize },
    /// The header carries an unsupported version.
    #[error("unsupported protocol version {0}")]
    Version(u8),
    /// A field holds a value outside its range.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },
    /// A field does not fit its length prefix.
    #[error("{field} too long ({len} > {max})")]
    TooLong { field: &'static str, len: usize, max: usize },
    /// Bytes left over after the body was decoded.
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
    /// A string field is not valid UTF-8.
    #[error("{field} is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { field: &'static str, valid_up_to: usize },
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
