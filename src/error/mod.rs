//! Error types shared across the crate.

use crate::event::ArgKind;
use crate::packet::PacketType;
use crate::transport::TransportError;

/// Result type used by the public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Top level error returned by socket, namespace and server operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid event arguments: {0}")]
    Args(#[from] ArgError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("socket is disconnected")]
    SocketClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text or binary frame could not be turned into a packet.
///
/// Every variant is fatal to the connection that produced the frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("invalid packet type {0:?}")]
    InvalidType(char),

    #[error("attachment count is not terminated by '-'")]
    UnterminatedAttachments,

    #[error("invalid attachment count {0:?}")]
    InvalidAttachments(String),

    #[error("{declared} attachments declared, at most {max} allowed")]
    TooManyAttachments { declared: usize, max: usize },

    #[error("invalid ack id {0:?}")]
    InvalidAckId(String),

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload shape is not valid for a {0:?} packet")]
    InvalidPayload(PacketType),

    #[error("binary frame received with no pending binary packet")]
    UnexpectedBinary,

    #[error("text frame received while {missing} attachments are still pending")]
    UnexpectedText { missing: usize },

    #[error("placeholder references attachment {num} of {count}")]
    BadPlaceholder { num: u64, count: usize },

    #[error("placeholder without a numeric \"num\" field")]
    MalformedPlaceholder,

    #[error("attachment {0} is referenced more than once")]
    DuplicatePlaceholder(u64),

    #[error("attachment {0} is never referenced by a placeholder")]
    UnusedAttachment(usize),
}

/// Event arguments did not match the handler's declared signature.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("expected at most {expected} arguments, got {got}")]
    TooMany { expected: usize, got: usize },

    #[error("expected at least {expected} arguments, got {got}")]
    Missing { expected: usize, got: usize },

    #[error("argument {index} is not {expected}")]
    Mismatch { index: usize, expected: ArgKind },
}
