use thiserror::Error;

use crate::shim::codec::CodecError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] CodecError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("helper reported an error: {0}")]
    Remote(String),

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
}

impl Error {
    pub fn violation(message: impl Into<String>) -> Self {
        Error::ProtocolViolation(message.into())
    }
}

/// Failures of the message pipe itself. Never retried here.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,

    #[error("peer unreachable")]
    Unreachable,

    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
